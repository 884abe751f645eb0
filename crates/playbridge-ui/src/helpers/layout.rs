// crates/playbridge-ui/src/helpers/layout.rs
//
// Where the video goes inside the space the control was given.

use egui::{Rect, Vec2};

use playbridge_core::{Stretch, StretchDirection};

/// Scale factors for showing `content` in `available` under `stretch`,
/// limited by `direction`. Degenerate sizes give (0, 0).
pub fn stretch_scale(available: Vec2, content: Vec2, stretch: Stretch, direction: StretchDirection) -> Vec2 {
    if content.x <= 0.0 || content.y <= 0.0 || available.x <= 0.0 || available.y <= 0.0 {
        return Vec2::ZERO;
    }
    let sx = available.x / content.x;
    let sy = available.y / content.y;
    let (sx, sy) = match stretch {
        Stretch::None          => (1.0, 1.0),
        Stretch::Fill          => (sx, sy),
        Stretch::Uniform       => (sx.min(sy), sx.min(sy)),
        Stretch::UniformToFill => (sx.max(sy), sx.max(sy)),
    };
    let limit = |s: f32| match direction {
        StretchDirection::UpOnly   => s.max(1.0),
        StretchDirection::DownOnly => s.min(1.0),
        StretchDirection::Both     => s,
    };
    Vec2::new(limit(sx), limit(sy))
}

/// The video rect, centered in `available`. May overflow `available` for
/// UniformToFill and UpOnly; callers clip.
pub fn fit_rect(available: Rect, content: Vec2, stretch: Stretch, direction: StretchDirection) -> Rect {
    let scale = stretch_scale(available.size(), content, stretch, direction);
    Rect::from_center_size(available.center(), content * scale)
}
