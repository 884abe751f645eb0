// crates/playbridge-core/src/media_types.rs
//
// Types that flow across channels between playbridge-media and playbridge-ui.
// No egui, no engine handles, just plain data.

use std::time::Duration;
use uuid::Uuid;

use crate::frame::{FrameBufferView, FrameError, PixelFormat};

/// Longest wait between two frames, whatever the reported rate.
pub const MAX_FRAME_INTERVAL: Duration = Duration::from_secs(10);

/// Static facts about an opened source.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    pub source:           String,
    pub width:            u32,
    pub height:           u32,
    pub frame_rate:       f64,
    /// None for live sources with no known end.
    pub natural_duration: Option<Duration>,
    pub start_time:       Duration,
    pub is_seekable:      bool,
}

impl MediaInfo {
    pub fn end_time(&self) -> Option<Duration> {
        self.natural_duration.map(|d| self.start_time + d)
    }

    /// Interval between frames, falling back to 30 fps for unknown rates and
    /// capped at `MAX_FRAME_INTERVAL`.
    pub fn frame_interval(&self) -> Duration {
        let fps = if self.frame_rate.is_finite() && self.frame_rate > 0.0 { self.frame_rate } else { 30.0 };
        Duration::try_from_secs_f64(1.0 / fps)
            .unwrap_or(MAX_FRAME_INTERVAL)
            .min(MAX_FRAME_INTERVAL)
    }
}

/// Session lifecycle notifications raised by the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaEvent {
    Opened { session: Uuid, info: MediaInfo },
    Ended  { session: Uuid },
    Failed { session: Option<Uuid>, message: String },
    Closed { session: Uuid },
}

/// One decoded picture in a pooled buffer.
///
/// The buffer belongs to the engine's frame pool. The consumer borrows it
/// through `view()`, copies it into a display surface and hands it back with
/// `MediaEngine::recycle_frame`; the producer overwrites it after that.
#[derive(Debug)]
pub struct DecodedFrame {
    pub session:      Uuid,
    pub position:     Duration,
    pub width:        u32,
    pub height:       u32,
    pub row_stride:   usize,
    pub pixel_format: PixelFormat,
    pub buffer:       Vec<u8>,
}

impl DecodedFrame {
    pub fn empty() -> Self {
        Self {
            session:      Uuid::nil(),
            position:     Duration::ZERO,
            width:        0,
            height:       0,
            row_stride:   0,
            pixel_format: PixelFormat::Rgba8888,
            buffer:       Vec::new(),
        }
    }

    /// Resize the buffer for a `width` x `height` picture with rows padded to
    /// `row_alignment` bytes. Keeps the existing allocation when it is large enough.
    pub fn reshape(&mut self, width: u32, height: u32, pixel_format: PixelFormat, row_alignment: usize) {
        let align = row_alignment.max(1);
        let row_bytes = width as usize * pixel_format.bytes_per_pixel();
        self.width        = width;
        self.height       = height;
        self.pixel_format = pixel_format;
        self.row_stride   = row_bytes.div_ceil(align) * align;
        self.buffer.resize(self.row_stride * height as usize, 0);
    }

    pub fn view(&self) -> Result<FrameBufferView<'_>, FrameError> {
        FrameBufferView::new(&self.buffer, self.row_stride, self.width, self.height, self.pixel_format)
    }

    pub fn view_with_dpi(&self, dpi_x: f64, dpi_y: f64) -> Result<FrameBufferView<'_>, FrameError> {
        self.view().map(|v| v.with_dpi(dpi_x, dpi_y))
    }
}

impl Default for DecodedFrame {
    fn default() -> Self { Self::empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reshape_pads_rows_and_reuses_allocation() {
        let mut f = DecodedFrame::empty();
        f.reshape(10, 4, PixelFormat::Rgba8888, 64);
        assert_eq!(f.row_stride, 64);
        assert_eq!(f.buffer.len(), 256);
        let cap = f.buffer.capacity();
        f.reshape(8, 2, PixelFormat::Rgba8888, 64);
        assert_eq!(f.buffer.len(), 128);
        assert_eq!(f.buffer.capacity(), cap);
        assert!(f.view().is_ok());
    }

    #[test]
    fn empty_frame_has_no_view() {
        assert!(DecodedFrame::empty().view().is_err());
    }

    #[test]
    fn end_time_offsets_by_start() {
        let info = MediaInfo {
            source:           "x".into(),
            width:            1,
            height:           1,
            frame_rate:       25.0,
            natural_duration: Some(Duration::from_secs(10)),
            start_time:       Duration::from_secs(2),
            is_seekable:      true,
        };
        assert_eq!(info.end_time(), Some(Duration::from_secs(12)));
        assert_eq!(info.frame_interval(), Duration::from_millis(40));
    }

    #[test]
    fn frame_interval_is_capped_for_tiny_rates() {
        let mut info = MediaInfo {
            source:           "x".into(),
            width:            1,
            height:           1,
            frame_rate:       1e-300,
            natural_duration: None,
            start_time:       Duration::ZERO,
            is_seekable:      false,
        };
        assert_eq!(info.frame_interval(), MAX_FRAME_INTERVAL);
        info.frame_rate = 0.05;
        assert_eq!(info.frame_interval(), MAX_FRAME_INTERVAL);
        info.frame_rate = f64::NAN;
        assert_eq!(info.frame_interval(), Duration::from_secs_f64(1.0 / 30.0));
    }
}
