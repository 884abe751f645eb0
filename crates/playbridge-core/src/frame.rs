// crates/playbridge-core/src/frame.rs
//
// FrameBufferView: a borrowed, stride-aware descriptor over raw decoded pixels,
// and the host display-surface contract it materializes into.
//
// Ownership: a view never owns its bytes. It borrows the decoder's buffer for
// the duration of the call, so the buffer cannot be recycled (and overwritten
// by the producer) while a copy is in flight. The borrow checker enforces the
// "copy completes before the buffer is reused" ordering.

use serde::{Deserialize, Serialize};

pub const DEFAULT_DPI: f64 = 96.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit R, G, B, A in memory order.
    Rgba8888,
    /// 8-bit B, G, R, A in memory order.
    Bgra8888,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("frame has zero size ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("row stride {stride} is shorter than a {width}px row of {bpp}-byte pixels")]
    StrideTooSmall { stride: usize, width: u32, bpp: usize },
    #[error("buffer holds {actual} bytes, stride x height needs {expected}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("pixel format mismatch: frame {frame:?}, surface {surface:?}")]
    FormatMismatch { frame: PixelFormat, surface: PixelFormat },
    #[error("surface does not support {0:?}")]
    UnsupportedFormat(PixelFormat),
    #[error("surface allocation failed: {0}")]
    Allocation(String),
}

// ── Host surface contract ─────────────────────────────────────────────────────

/// Size, resolution and format of a surface to allocate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceDesc {
    pub width:        u32,
    pub height:       u32,
    pub dpi_x:        f64,
    pub dpi_y:        f64,
    pub pixel_format: PixelFormat,
}

/// A surface locked for writing.
pub trait WritableSurface {
    fn pixel_format(&self) -> PixelFormat;
    /// Bytes between the starts of two consecutive rows.
    fn row_stride(&self) -> usize;
    fn height(&self) -> u32;
    /// The whole locked pixel area, `row_stride * height` bytes at least.
    fn pixels_mut(&mut self) -> &mut [u8];
}

/// Allocates locked surfaces and unlocks them into display-ready objects.
/// Unlocking consumes the lock, so a surface can only be shown once every
/// write to it has finished.
pub trait SurfaceFactory {
    type Locked: WritableSurface;
    type Surface;

    fn allocate_locked(&mut self, desc: &SurfaceDesc) -> Result<Self::Locked, FrameError>;
    fn unlock(&mut self, locked: Self::Locked) -> Self::Surface;
}

// ── FrameBufferView ───────────────────────────────────────────────────────────

/// Immutable view of one decoded frame's pixels.
///
/// Invariant: `buffer_length() == row_stride * height` and the borrowed slice
/// is at least that long; checked once in `new`.
#[derive(Clone, Copy, Debug)]
pub struct FrameBufferView<'a> {
    data:            &'a [u8],
    row_stride:      usize,
    bytes_per_pixel: usize,
    width:           u32,
    height:          u32,
    dpi_x:           f64,
    dpi_y:           f64,
    pixel_format:    PixelFormat,
}

impl<'a> FrameBufferView<'a> {
    pub fn new(
        data:         &'a [u8],
        row_stride:   usize,
        width:        u32,
        height:       u32,
        pixel_format: PixelFormat,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let bpp = pixel_format.bytes_per_pixel();
        if row_stride < width as usize * bpp {
            return Err(FrameError::StrideTooSmall { stride: row_stride, width, bpp });
        }
        let expected = row_stride * height as usize;
        if data.len() < expected {
            return Err(FrameError::BufferTooSmall { expected, actual: data.len() });
        }
        Ok(Self {
            data: &data[..expected],
            row_stride,
            bytes_per_pixel: bpp,
            width,
            height,
            dpi_x: DEFAULT_DPI,
            dpi_y: DEFAULT_DPI,
            pixel_format,
        })
    }

    pub fn with_dpi(mut self, dpi_x: f64, dpi_y: f64) -> Self {
        self.dpi_x = dpi_x;
        self.dpi_y = dpi_y;
        self
    }

    pub fn base(&self) -> &'a [u8] { self.data }
    pub fn row_stride(&self) -> usize { self.row_stride }
    pub fn bytes_per_pixel(&self) -> usize { self.bytes_per_pixel }
    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }
    pub fn dpi(&self) -> (f64, f64) { (self.dpi_x, self.dpi_y) }
    pub fn pixel_format(&self) -> PixelFormat { self.pixel_format }
    pub fn buffer_length(&self) -> usize { self.row_stride * self.height as usize }

    /// Bytes of row `y`, padding included.
    pub fn row(&self, y: u32) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.row_stride;
        Some(&self.data[start..start + self.row_stride])
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<&'a [u8]> {
        if x >= self.width {
            return None;
        }
        let start = x as usize * self.bytes_per_pixel;
        self.row(y).map(|r| &r[start..start + self.bytes_per_pixel])
    }

    pub fn surface_desc(&self) -> SurfaceDesc {
        SurfaceDesc {
            width:        self.width,
            height:       self.height,
            dpi_x:        self.dpi_x,
            dpi_y:        self.dpi_y,
            pixel_format: self.pixel_format,
        }
    }

    /// Allocate a display surface from `factory`, row-copy the frame into it
    /// and return it unlocked. No pixel-format conversion is performed.
    ///
    /// Each row copies `min(source stride, target stride)` bytes; a target
    /// whose rows cannot hold `width` pixels is rejected before any copy.
    pub fn materialize<F: SurfaceFactory>(&self, factory: &mut F) -> Result<F::Surface, FrameError> {
        let mut locked = factory.allocate_locked(&self.surface_desc())?;

        let target_format = locked.pixel_format();
        if target_format != self.pixel_format {
            return Err(FrameError::FormatMismatch {
                frame:   self.pixel_format,
                surface: target_format,
            });
        }

        let target_stride = locked.row_stride();
        let row_bytes = self.width as usize * self.bytes_per_pixel;
        if target_stride < row_bytes {
            return Err(FrameError::StrideTooSmall {
                stride: target_stride,
                width:  self.width,
                bpp:    self.bytes_per_pixel,
            });
        }

        let copy_len = self.row_stride.min(target_stride);
        let height = self.height as usize;
        let target_len = target_stride * (height - 1) + copy_len;
        {
            let dst = locked.pixels_mut();
            if dst.len() < target_len {
                return Err(FrameError::BufferTooSmall { expected: target_len, actual: dst.len() });
            }
            for y in 0..height {
                let src = y * self.row_stride;
                let tgt = y * target_stride;
                dst[tgt..tgt + copy_len].copy_from_slice(&self.data[src..src + copy_len]);
            }
        }

        Ok(factory.unlock(locked))
    }
}

// ── Bitmap ────────────────────────────────────────────────────────────────────

/// Owned in-memory surface. Doubles as its own locked form.
#[derive(Clone, Debug, PartialEq)]
pub struct Bitmap {
    pub width:        u32,
    pub height:       u32,
    pub row_stride:   usize,
    pub dpi_x:        f64,
    pub dpi_y:        f64,
    pub pixel_format: PixelFormat,
    pub pixels:       Vec<u8>,
}

impl Bitmap {
    pub fn view(&self) -> Result<FrameBufferView<'_>, FrameError> {
        FrameBufferView::new(&self.pixels, self.row_stride, self.width, self.height, self.pixel_format)
            .map(|v| v.with_dpi(self.dpi_x, self.dpi_y))
    }

    /// Tightly packed pixel rows, padding stripped.
    pub fn packed_pixels(&self) -> Vec<u8> {
        let row_bytes = self.width as usize * self.pixel_format.bytes_per_pixel();
        (0..self.height as usize)
            .flat_map(|row| {
                let s = row * self.row_stride;
                &self.pixels[s..s + row_bytes]
            })
            .copied()
            .collect()
    }
}

impl WritableSurface for Bitmap {
    fn pixel_format(&self) -> PixelFormat { self.pixel_format }
    fn row_stride(&self) -> usize { self.row_stride }
    fn height(&self) -> u32 { self.height }
    fn pixels_mut(&mut self) -> &mut [u8] { &mut self.pixels }
}

/// Allocates `Bitmap`s with rows padded to `row_alignment` bytes.
#[derive(Clone, Debug)]
pub struct BitmapFactory {
    pub row_alignment: usize,
    /// Formats this factory accepts. Empty means any.
    pub formats:       Vec<PixelFormat>,
}

impl Default for BitmapFactory {
    fn default() -> Self {
        Self { row_alignment: 1, formats: Vec::new() }
    }
}

impl BitmapFactory {
    pub fn aligned(row_alignment: usize) -> Self {
        Self { row_alignment: row_alignment.max(1), ..Self::default() }
    }
}

impl SurfaceFactory for BitmapFactory {
    type Locked  = Bitmap;
    type Surface = Bitmap;

    fn allocate_locked(&mut self, desc: &SurfaceDesc) -> Result<Bitmap, FrameError> {
        if !self.formats.is_empty() && !self.formats.contains(&desc.pixel_format) {
            return Err(FrameError::UnsupportedFormat(desc.pixel_format));
        }
        let align = self.row_alignment.max(1);
        let row_bytes = desc.width as usize * desc.pixel_format.bytes_per_pixel();
        let row_stride = row_bytes.div_ceil(align) * align;
        Ok(Bitmap {
            width:        desc.width,
            height:       desc.height,
            row_stride,
            dpi_x:        desc.dpi_x,
            dpi_y:        desc.dpi_y,
            pixel_format: desc.pixel_format,
            pixels:       vec![0u8; row_stride * desc.height as usize],
        })
    }

    fn unlock(&mut self, locked: Bitmap) -> Bitmap {
        locked
    }
}
