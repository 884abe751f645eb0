// crates/playbridge-media/src/source.rs
//
// Media sources: anything that can describe itself and paint the picture at a
// given position into a pooled frame.
//
// SourceRegistry resolves a URI to a source by scheme. `pattern:` is always
// available and needs no codec; with the `ffmpeg` feature every other URI
// falls through to the file decoder.

use std::time::Duration;

use playbridge_core::{DecodedFrame, EngineError, MediaInfo, PixelFormat};

/// Rows of generated frames are padded to this many bytes.
pub const PATTERN_ROW_ALIGNMENT: usize = 64;

pub trait MediaSource: Send {
    fn info(&self) -> &MediaInfo;

    /// Paint the picture shown at `position` into `frame`, reshaping it as needed.
    fn read_frame(&mut self, position: Duration, frame: &mut DecodedFrame) -> Result<(), EngineError>;
}

pub trait SourceOpener: Send + Sync {
    fn open(&self, uri: &str) -> Result<Box<dyn MediaSource>, EngineError>;
}

type Handler = Box<dyn Fn(&str) -> Result<Box<dyn MediaSource>, EngineError> + Send + Sync>;

// ── Registry ──────────────────────────────────────────────────────────────────

pub struct SourceRegistry {
    schemes:  Vec<(String, Handler)>,
    fallback: Option<Handler>,
}

impl Default for SourceRegistry {
    fn default() -> Self { Self::with_defaults() }
}

impl SourceRegistry {
    /// A registry that resolves nothing.
    pub fn empty() -> Self {
        Self { schemes: Vec::new(), fallback: None }
    }

    pub fn with_defaults() -> Self {
        let mut reg = Self::empty();
        reg.register("pattern", |uri| {
            TestPatternSource::open(uri).map(|s| Box::new(s) as Box<dyn MediaSource>)
        });
        #[cfg(feature = "ffmpeg")]
        reg.set_fallback(|uri| {
            crate::ffmpeg::FfmpegSource::open(uri).map(|s| Box::new(s) as Box<dyn MediaSource>)
        });
        reg
    }

    /// Route URIs of the form `scheme:...` to `handler`. Later registrations win.
    pub fn register(
        &mut self,
        scheme: &str,
        handler: impl Fn(&str) -> Result<Box<dyn MediaSource>, EngineError> + Send + Sync + 'static,
    ) {
        self.schemes.retain(|(s, _)| !s.eq_ignore_ascii_case(scheme));
        self.schemes.push((scheme.to_ascii_lowercase(), Box::new(handler)));
    }

    /// Handler for URIs with no registered scheme (plain file paths).
    pub fn set_fallback(
        &mut self,
        handler: impl Fn(&str) -> Result<Box<dyn MediaSource>, EngineError> + Send + Sync + 'static,
    ) {
        self.fallback = Some(Box::new(handler));
    }
}

/// Scheme of `uri`, ignoring single letters so `C:\clip.mp4` reads as a path.
fn scheme_of(uri: &str) -> Option<&str> {
    let (scheme, _) = uri.split_once(':')?;
    (scheme.len() > 1 && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-'))
        .then_some(scheme)
}

impl SourceOpener for SourceRegistry {
    fn open(&self, uri: &str) -> Result<Box<dyn MediaSource>, EngineError> {
        if let Some(scheme) = scheme_of(uri) {
            if let Some((_, handler)) = self.schemes.iter().find(|(s, _)| s.eq_ignore_ascii_case(scheme)) {
                return handler(uri);
            }
        }
        match &self.fallback {
            Some(handler) => handler(uri),
            None => Err(EngineError::UnsupportedSource(uri.to_string())),
        }
    }
}

// ── Test pattern ──────────────────────────────────────────────────────────────

pub const MIN_PATTERN_FPS: f64 = 0.01;
pub const MAX_PATTERN_FPS: f64 = 1000.0;

/// A generated source: `pattern:WxH@FPS/SECONDS`, or `pattern:WxH@FPS/live`
/// for an endless, unseekable stream.
#[derive(Clone, Debug, PartialEq)]
pub struct TestPattern {
    pub width:      u32,
    pub height:     u32,
    pub frame_rate: f64,
    pub duration:   Option<Duration>,
}

impl TestPattern {
    pub fn parse(uri: &str) -> Result<Self, EngineError> {
        let bad = |why: &str| EngineError::open(uri, why);
        let body = uri
            .strip_prefix("pattern:")
            .ok_or_else(|| bad("expected pattern: prefix"))?;
        let (size, rest)   = body.split_once('@').ok_or_else(|| bad("missing @fps"))?;
        let (fps, length)  = rest.split_once('/').ok_or_else(|| bad("missing /duration"))?;
        let (w, h)         = size.split_once('x').ok_or_else(|| bad("size must be WxH"))?;

        let width:  u32 = w.trim().parse().map_err(|_| bad("bad width"))?;
        let height: u32 = h.trim().parse().map_err(|_| bad("bad height"))?;
        let frame_rate: f64 = fps.trim().parse().map_err(|_| bad("bad frame rate"))?;
        if width == 0 || height == 0 {
            return Err(bad("size must be non-zero"));
        }
        if !(MIN_PATTERN_FPS..=MAX_PATTERN_FPS).contains(&frame_rate) {
            return Err(bad("frame rate out of range"));
        }
        let duration = match length.trim() {
            "live" => None,
            secs => {
                let s: f64 = secs.parse().map_err(|_| bad("bad duration"))?;
                if !(s.is_finite() && s > 0.0) {
                    return Err(bad("duration must be positive"));
                }
                Some(Duration::try_from_secs_f64(s).map_err(|_| bad("duration out of range"))?)
            }
        };
        Ok(Self { width, height, frame_rate, duration })
    }

    pub fn frame_index(&self, position: Duration) -> u64 {
        (position.as_secs_f64() * self.frame_rate) as u64
    }

    /// RGBA value of pixel (x, y) in frame `index`. A white bar sweeps one
    /// column per frame; everything else encodes x, y and the frame index.
    pub fn pixel(&self, index: u64, x: u32, y: u32) -> [u8; 4] {
        if u64::from(x) == index % u64::from(self.width) {
            return [255, 255, 255, 255];
        }
        [x as u8, y as u8, index as u8, 255]
    }
}

pub struct TestPatternSource {
    pattern: TestPattern,
    info:    MediaInfo,
}

impl TestPatternSource {
    pub fn open(uri: &str) -> Result<Self, EngineError> {
        let pattern = TestPattern::parse(uri)?;
        let info = MediaInfo {
            source:           uri.to_string(),
            width:            pattern.width,
            height:           pattern.height,
            frame_rate:       pattern.frame_rate,
            natural_duration: pattern.duration,
            start_time:       Duration::ZERO,
            is_seekable:      pattern.duration.is_some(),
        };
        Ok(Self { pattern, info })
    }

    pub fn pattern(&self) -> &TestPattern { &self.pattern }
}

impl MediaSource for TestPatternSource {
    fn info(&self) -> &MediaInfo { &self.info }

    fn read_frame(&mut self, position: Duration, frame: &mut DecodedFrame) -> Result<(), EngineError> {
        let p = &self.pattern;
        frame.reshape(p.width, p.height, PixelFormat::Rgba8888, PATTERN_ROW_ALIGNMENT);
        let index  = p.frame_index(position);
        let stride = frame.row_stride;
        for y in 0..p.height {
            let row = &mut frame.buffer[y as usize * stride..][..p.width as usize * 4];
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                px.copy_from_slice(&p.pixel(index, x as u32, y));
            }
        }
        frame.position = position;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_finite_and_live_patterns() {
        let p = TestPattern::parse("pattern:64x36@30/10").unwrap();
        assert_eq!((p.width, p.height), (64, 36));
        assert_eq!(p.frame_rate, 30.0);
        assert_eq!(p.duration, Some(Duration::from_secs(10)));

        let live = TestPattern::parse("pattern:8x8@25/live").unwrap();
        assert_eq!(live.duration, None);
    }

    #[test]
    fn rejects_malformed_patterns() {
        for uri in ["pattern:64x36", "pattern:0x4@30/1", "pattern:4x4@0/1", "pattern:4x4@30/-2", "pattern:ax4@30/1"] {
            assert!(matches!(TestPattern::parse(uri), Err(EngineError::Open { .. })), "{uri}");
        }
    }

    #[test]
    fn rejects_out_of_range_numbers() {
        for uri in ["pattern:8x8@30/1e30", "pattern:8x8@1e-300/5", "pattern:8x8@1e9/5", "pattern:8x8@NaN/5"] {
            assert!(matches!(TestPattern::parse(uri), Err(EngineError::Open { .. })), "{uri}");
            assert!(TestPatternSource::open(uri).is_err(), "{uri}");
        }
    }

    #[test]
    fn live_pattern_is_not_seekable() {
        let src = TestPatternSource::open("pattern:8x8@25/live").unwrap();
        assert!(!src.info().is_seekable);
        assert_eq!(src.info().end_time(), None);
    }

    #[test]
    fn frames_are_padded_and_deterministic() {
        let mut src = TestPatternSource::open("pattern:10x3@10/5").unwrap();
        let mut frame = DecodedFrame::empty();
        src.read_frame(Duration::from_millis(1250), &mut frame).unwrap();
        assert_eq!(frame.row_stride, 64);
        let view = frame.view().unwrap();
        // index 12, bar at column 2
        assert_eq!(view.pixel(2, 0), Some(&[255, 255, 255, 255][..]));
        assert_eq!(view.pixel(5, 1), Some(&[5, 1, 12, 255][..]));
    }

    #[test]
    fn registry_routes_by_scheme() {
        let reg = SourceRegistry::empty();
        assert!(matches!(reg.open("pattern:4x4@30/1"), Err(EngineError::UnsupportedSource(_))));

        let reg = SourceRegistry::with_defaults();
        assert!(reg.open("pattern:4x4@30/1").is_ok());
        #[cfg(not(feature = "ffmpeg"))]
        assert!(matches!(reg.open("/tmp/none.mp4"), Err(EngineError::UnsupportedSource(_))));
    }

    #[test]
    fn drive_letters_are_not_schemes() {
        assert_eq!(scheme_of(r"C:\clips\a.mp4"), None);
        assert_eq!(scheme_of("pattern:1x1@1/1"), Some("pattern"));
        assert_eq!(scheme_of("/tmp/a.mp4"), None);
    }
}
