// crates/playbridge-ui/src/surface.rs
//
// The egui display surface. A locked surface is a fresh ColorImage exposed as
// raw bytes; unlocking hands the finished image over for texture upload.
//
// Color32 is premultiplied RGBA, so straight-alpha frames are only exact when
// opaque. Decoded video is; nothing here converts.

use egui::{Color32, ColorImage};

use playbridge_core::{FrameError, PixelFormat, SurfaceDesc, SurfaceFactory, WritableSurface};

pub struct LockedImage {
    image: ColorImage,
}

impl WritableSurface for LockedImage {
    fn pixel_format(&self) -> PixelFormat { PixelFormat::Rgba8888 }
    fn row_stride(&self) -> usize { self.image.size[0] * 4 }
    fn height(&self) -> u32 { self.image.size[1] as u32 }
    fn pixels_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.image.pixels)
    }
}

#[derive(Debug, Default)]
pub struct TextureSurfaceFactory {
    allocated: u64,
}

impl TextureSurfaceFactory {
    pub fn new() -> Self { Self::default() }

    /// Surfaces handed out so far.
    pub fn allocated(&self) -> u64 { self.allocated }
}

impl SurfaceFactory for TextureSurfaceFactory {
    type Locked  = LockedImage;
    type Surface = ColorImage;

    fn allocate_locked(&mut self, desc: &SurfaceDesc) -> Result<LockedImage, FrameError> {
        if desc.pixel_format != PixelFormat::Rgba8888 {
            return Err(FrameError::UnsupportedFormat(desc.pixel_format));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(FrameError::Empty { width: desc.width, height: desc.height });
        }
        let (w, h) = (desc.width as usize, desc.height as usize);
        let count = w
            .checked_mul(h)
            .ok_or_else(|| FrameError::Allocation(format!("{w}x{h} overflows")))?;
        self.allocated += 1;
        Ok(LockedImage { image: ColorImage::new([w, h], vec![Color32::TRANSPARENT; count]) })
    }

    fn unlock(&mut self, locked: LockedImage) -> ColorImage {
        locked.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playbridge_core::FrameBufferView;

    #[test]
    fn materializes_padded_rgba_into_color_image() {
        // 2x2 frame, rows padded to 16 bytes.
        let mut buf = vec![0u8; 32];
        for y in 0..2 {
            for x in 0..2 {
                let i = y * 16 + x * 4;
                buf[i..i + 4].copy_from_slice(&[x as u8 * 100, y as u8 * 100, 7, 255]);
            }
        }
        let view = FrameBufferView::new(&buf, 16, 2, 2, PixelFormat::Rgba8888).unwrap();
        let mut factory = TextureSurfaceFactory::new();
        let image = view.materialize(&mut factory).unwrap();
        assert_eq!(image.size, [2, 2]);
        assert_eq!(image.pixels[3], Color32::from_rgba_premultiplied(100, 100, 7, 255));
        assert_eq!(factory.allocated(), 1);
    }

    #[test]
    fn bgra_frames_are_refused() {
        let buf = vec![0u8; 16];
        let view = FrameBufferView::new(&buf, 8, 2, 2, PixelFormat::Bgra8888).unwrap();
        assert_eq!(
            view.materialize(&mut TextureSurfaceFactory::new()).unwrap_err(),
            FrameError::UnsupportedFormat(PixelFormat::Bgra8888)
        );
    }
}
