// crates/playbridge-media/src/ffmpeg.rs
//
// FfmpegSource: file-backed MediaSource (feature "ffmpeg").
//
// Stateful like a live decoder: sequential reads decode forward from the last
// position; backward moves and forward jumps beyond REOPEN_WINDOW_SECS seek to
// the preceding keyframe and burn forward to the target.

use std::path::Path;
use std::sync::Once;
use std::time::Duration;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;

use playbridge_core::{DecodedFrame, EngineError, MediaInfo, PixelFormat};

use crate::source::MediaSource;

/// Forward distance decoded sequentially before seeking instead.
const REOPEN_WINDOW_SECS: f64 = 2.0;
const ROW_ALIGNMENT: usize = 64;

static INIT: Once = Once::new();

pub struct FfmpegSource {
    info:      MediaInfo,
    ictx:      ffmpeg::format::context::Input,
    decoder:   ffmpeg::decoder::video::Video,
    scaler:    SwsContext,
    video_idx: usize,
    tb_num:    i32,
    tb_den:    i32,
    last_pts:  Option<i64>,
    scaled:    VideoFrame,
}

// SAFETY: the source is owned and used by a single playback thread at a time;
// ffmpeg contexts are not shared.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    pub fn open(uri: &str) -> Result<Self, EngineError> {
        INIT.call_once(|| {
            if let Err(e) = ffmpeg::init() {
                log::error!("[ffmpeg] init: {e}");
            }
        });
        let path = Path::new(uri.strip_prefix("file:").unwrap_or(uri));
        let fail = |e: &dyn std::fmt::Display| EngineError::open(uri, e.to_string());

        let ictx = input(path).map_err(|e| fail(&e))?;
        let (video_idx, tb_num, tb_den, frame_rate) = {
            let stream = ictx.streams().best(Type::Video).ok_or_else(|| fail(&"no video stream"))?;
            let tb  = stream.time_base();
            let afr = stream.avg_frame_rate();
            let fps = if afr.denominator() != 0 { f64::from(afr) } else { 0.0 };
            (stream.index(), tb.numerator(), tb.denominator(), fps)
        };
        if tb_num <= 0 || tb_den <= 0 {
            return Err(fail(&"invalid stream time base"));
        }

        // Second context for decoder params (Parameters borrows from the stream).
        let ictx2   = input(path).map_err(|e| fail(&e))?;
        let stream2 = ictx2.stream(video_idx).ok_or_else(|| fail(&"stream gone"))?;
        let dec_ctx = ffmpeg::codec::context::Context::from_parameters(stream2.parameters())
            .map_err(|e| fail(&e))?;
        let decoder = dec_ctx.decoder().video().map_err(|e| fail(&e))?;

        let (w, h) = (decoder.width(), decoder.height());
        let scaler = SwsContext::get(decoder.format(), w, h, Pixel::RGBA, w, h, Flags::BILINEAR)
            .map_err(|e| fail(&e))?;

        let raw_duration = ictx.duration();
        let natural_duration = (raw_duration > 0).then(|| {
            Duration::from_micros((raw_duration as f64 * 1_000_000.0 / ffmpeg::ffi::AV_TIME_BASE as f64) as u64)
        });

        let info = MediaInfo {
            source:           uri.to_string(),
            width:            w,
            height:           h,
            frame_rate,
            natural_duration,
            start_time:       Duration::ZERO,
            is_seekable:      natural_duration.is_some(),
        };
        log::debug!("[ffmpeg] opened {uri}: {w}x{h} @ {frame_rate:.3} fps");

        Ok(Self {
            info, ictx, decoder, scaler, video_idx, tb_num, tb_den,
            last_pts: None,
            scaled:   VideoFrame::empty(),
        })
    }

    fn secs_to_pts(&self, t: f64) -> i64 {
        (t * self.tb_den as f64 / self.tb_num as f64) as i64
    }

    fn seek_to(&mut self, target_secs: f64) {
        if target_secs > 0.0 {
            let seek_ts = (target_secs * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;
            if let Err(e) = self.ictx.seek(seek_ts, ..=seek_ts) {
                log::warn!("[ffmpeg] seek soft-fail at {target_secs:.3}s: {e}, decoding from current position");
            }
        } else if let Err(e) = self.ictx.seek(0, ..=0) {
            log::warn!("[ffmpeg] rewind soft-fail: {e}");
        }
        self.decoder.flush();
        self.last_pts = None;
    }

    /// Decode forward until a frame at or past `target_pts`, scaling it into
    /// `self.scaled`. Keeps the last decoded frame when EOF comes first.
    fn advance_to(&mut self, target_pts: i64) -> bool {
        let mut have_frame = false;
        for (stream, packet) in self.ictx.packets().flatten() {
            if stream.index() != self.video_idx { continue; }
            if self.decoder.send_packet(&packet).is_err() { continue; }
            let mut decoded = VideoFrame::empty();
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let pts = decoded.pts().unwrap_or_else(|| self.last_pts.map_or(0, |p| p + 1));
                self.last_pts = Some(pts);
                if self.scaler.run(&decoded, &mut self.scaled).is_err() {
                    return have_frame;
                }
                have_frame = true;
                if pts >= target_pts {
                    return true;
                }
            }
        }
        have_frame
    }
}

impl MediaSource for FfmpegSource {
    fn info(&self) -> &MediaInfo { &self.info }

    fn read_frame(&mut self, position: Duration, frame: &mut DecodedFrame) -> Result<(), EngineError> {
        let secs       = position.as_secs_f64();
        let target_pts = self.secs_to_pts(secs);
        let window     = self.secs_to_pts(REOPEN_WINDOW_SECS);
        let reset = match self.last_pts {
            Some(last) => target_pts < last || target_pts > last + window,
            None => true,
        };
        if reset {
            self.seek_to(secs);
        }
        if !self.advance_to(target_pts) {
            return Err(EngineError::Read(format!("no frame at {secs:.3}s")));
        }

        let (w, h) = (self.info.width, self.info.height);
        frame.reshape(w, h, PixelFormat::Rgba8888, ROW_ALIGNMENT);
        let src_stride = self.scaled.stride(0);
        let src        = self.scaled.data(0);
        let row_bytes  = w as usize * 4;
        for row in 0..h as usize {
            let s = row * src_stride;
            let d = row * frame.row_stride;
            frame.buffer[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
        }
        frame.position = position;
        Ok(())
    }
}
