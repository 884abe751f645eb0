// crates/playbridge-ui/tests/end_to_end.rs
//
// A real PlaybackEngine on a test pattern, driven through a MediaElement the
// way an egui host would drive it.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use playbridge_core::{MediaPlaybackState, PlaybackProperty};
use playbridge_media::{MediaEngine, PlaybackEngine};
use playbridge_ui::{ElementConfig, MediaElement};

const SOURCE: &str = "pattern:64x36@30/10";

fn setup() -> (Arc<PlaybackEngine>, MediaElement, egui::Context) {
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = Arc::new(PlaybackEngine::with_defaults());
    let element = MediaElement::new(engine.clone() as Arc<dyn MediaEngine>, ElementConfig::default());
    (engine, element, egui::Context::default())
}

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn position_write_is_clamped_and_seeks_the_engine() {
    let (engine, mut el, _ctx) = setup();
    el.open(SOURCE).unwrap();

    let accepted = el.mirror_mut().set_position(Duration::from_secs(15));
    assert_eq!(accepted, Duration::from_secs(10));
    assert_eq!(el.mirror().position(), Duration::from_secs(10));
    wait_for("engine seek", || engine.state().position() == Duration::from_secs(10));
}

#[test]
fn volume_write_is_clamped_by_the_engine() {
    let (engine, mut el, _ctx) = setup();
    el.open(SOURCE).unwrap();

    assert_eq!(el.mirror_mut().set_volume(1.5), 1.0);
    assert_eq!(engine.state().volume(), 1.0);
    assert_eq!(el.mirror_mut().set_volume(-3.0), 0.0);
    assert_eq!(engine.state().volume(), 0.0);
}

#[test]
fn rapid_engine_changes_collapse_into_one_refresh() {
    let (engine, mut el, ctx) = setup();
    el.open(SOURCE).unwrap();

    let seen = Rc::new(Cell::new(0u32));
    let count = Rc::clone(&seen);
    el.mirror_mut().observe(PlaybackProperty::Volume, move |_, _| count.set(count.get() + 1));

    for i in 0..200 {
        engine.state().set_volume(if i % 2 == 0 { 0.2 } else { 0.8 });
    }
    engine.state().set_volume(0.3);

    let ticks = el.pump().ticks();
    el.update_at(&ctx, Instant::now() + Duration::from_millis(50));
    assert_eq!(el.pump().ticks(), ticks + 1);
    assert_eq!(seen.get(), 1);
    assert_eq!(el.mirror().volume(), 0.3);
    assert!(el.pump().queue().is_empty());
}

#[test]
fn playback_advances_position_and_frames() {
    let (engine, mut el, ctx) = setup();
    el.open(SOURCE).unwrap();
    el.play().unwrap();
    assert_eq!(el.mirror().media_state(), MediaPlaybackState::Play);

    wait_for("several frames", || {
        el.update(&ctx);
        el.stats().delivered >= 3
    });
    el.update_at(&ctx, Instant::now() + Duration::from_millis(50));
    assert!(el.mirror().position() > Duration::ZERO);
    assert_eq!(el.texture().map(|t| t.size()), Some([64, 36]));

    el.pause().unwrap();
    assert_eq!(engine.state().media_state(), MediaPlaybackState::Pause);
}

#[test]
fn snapshot_of_displayed_frame() {
    let (_engine, mut el, ctx) = setup();
    el.open(SOURCE).unwrap();
    wait_for("first frame", || {
        el.update(&ctx);
        el.snapshot().is_some()
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snap.png");
    el.save_snapshot(&path).unwrap();
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
}

#[test]
fn unload_closes_then_disposes() {
    let (engine, mut el, ctx) = setup();
    el.open(SOURCE).unwrap();
    assert!(el.unload());
    assert!(engine.is_disposed());
    assert!(!engine.state().is_open());

    // Engine state keeps changing after teardown; the mirror never hears of it.
    let before = el.mirror().balance();
    engine.state().set_balance(0.9);
    el.update_at(&ctx, Instant::now() + Duration::from_millis(50));
    assert_eq!(el.mirror().balance(), before);
}
