use reelflow_core::{FrameBuffer, Result};

use super::blend_rows;
use crate::mixer::MixerInstance;

/// Fades the bottom layer out to black, then the top layer in.
pub struct DipToBlack;

impl MixerInstance for DipToBlack {
    fn name(&self) -> &str {
        "dip_to_black"
    }

    fn process(
        &self,
        _time: f64,
        progress: f32,
        bottom: &FrameBuffer,
        top: &FrameBuffer,
        output: &mut FrameBuffer,
    ) -> Result<()> {
        let p = progress.clamp(0.0, 1.0);
        let bpp = bottom.format.bytes_per_pixel();
        let has_alpha = bottom.format.has_alpha();
        let (fade, use_top) = if p < 0.5 {
            (1.0 - p * 2.0, false)
        } else {
            ((p - 0.5) * 2.0, true)
        };
        blend_rows(bottom, top, output, |a, b, out| {
            let src = if use_top { b } else { a };
            for (i, (o, s)) in out.iter_mut().zip(src).enumerate() {
                *o = if has_alpha && i % bpp == 3 {
                    255
                } else {
                    (*s as f32 * fade).round() as u8
                };
            }
        })
    }
}
