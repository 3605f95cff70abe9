//! CPU layer compositing.

use rayon::prelude::*;
use reelflow_core::{FrameBuffer, PixelFormat, ReelflowError, Result};

/// Composite `src` over `dst` in place.
///
/// RGBA layers use straight alpha "over"; RGB layers have no alpha and
/// replace what is below them.
pub fn blend_over(dst: &mut FrameBuffer, src: &FrameBuffer) -> Result<()> {
    if !dst.is_compatible(src) {
        return Err(ReelflowError::InvalidParameter(format!(
            "cannot composite {}x{} {:?} layer onto {}x{} {:?} frame",
            src.width, src.height, src.format, dst.width, dst.height, dst.format
        )));
    }
    let stride = dst.stride();
    let row_bytes = dst.row_bytes();
    let format = dst.format;

    dst.data_mut()
        .par_chunks_mut(stride)
        .zip(src.data().par_chunks(stride))
        .for_each(|(d, s)| match format {
            PixelFormat::Rgb24 => d[..row_bytes].copy_from_slice(&s[..row_bytes]),
            PixelFormat::Rgba8 => {
                for (dp, sp) in d[..row_bytes]
                    .chunks_exact_mut(4)
                    .zip(s[..row_bytes].chunks_exact(4))
                {
                    blend_pixel(dp, sp);
                }
            }
        });
    Ok(())
}

#[inline]
fn blend_pixel(dst: &mut [u8], src: &[u8]) {
    let sa = src[3] as u32;
    match sa {
        255 => dst.copy_from_slice(src),
        0 => {}
        _ => {
            let inv = 255 - sa;
            for c in 0..3 {
                dst[c] = ((src[c] as u32 * sa + dst[c] as u32 * inv + 127) / 255) as u8;
            }
            dst[3] = (sa + (dst[3] as u32 * inv + 127) / 255).min(255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelflow_core::Rgba8;

    #[test]
    fn test_opaque_layer_replaces() {
        let mut dst = FrameBuffer::blank(6, 3, PixelFormat::Rgba8);
        let mut src = FrameBuffer::new(6, 3, PixelFormat::Rgba8);
        src.fill(Rgba8::opaque(10, 20, 30));
        blend_over(&mut dst, &src).unwrap();
        assert_eq!(dst.pixel(5, 2), Rgba8::opaque(10, 20, 30));
    }

    #[test]
    fn test_transparent_layer_keeps_background() {
        let mut dst = FrameBuffer::new(2, 2, PixelFormat::Rgba8);
        dst.fill(Rgba8::WHITE);
        let src = FrameBuffer::new(2, 2, PixelFormat::Rgba8);
        blend_over(&mut dst, &src).unwrap();
        assert_eq!(dst.pixel(0, 0), Rgba8::WHITE);
    }

    #[test]
    fn test_half_alpha() {
        let mut dst = FrameBuffer::blank(2, 2, PixelFormat::Rgba8);
        let mut src = FrameBuffer::new(2, 2, PixelFormat::Rgba8);
        src.fill(Rgba8::new(200, 100, 0, 128));
        blend_over(&mut dst, &src).unwrap();
        let px = dst.pixel(1, 1);
        assert_eq!((px.r, px.g, px.b, px.a), (100, 50, 0, 255));
    }

    #[test]
    fn test_rgb_layers_copy() {
        let mut dst = FrameBuffer::new(3, 3, PixelFormat::Rgb24);
        let mut src = FrameBuffer::new(3, 3, PixelFormat::Rgb24);
        src.fill(Rgba8::opaque(1, 2, 3));
        blend_over(&mut dst, &src).unwrap();
        assert_eq!(dst.pixel(2, 0), Rgba8::opaque(1, 2, 3));
        let small = FrameBuffer::new(2, 3, PixelFormat::Rgb24);
        assert!(blend_over(&mut dst, &small).is_err());
    }
}
