//! Built-in filters.

use rayon::prelude::*;
use reelflow_core::{FrameBuffer, Result};

use crate::ensure_compatible;
use crate::filter::FilterInstance;

/// Apply `op` to the color channels of every pixel, one row per task.
/// Alpha is copied through.
fn map_pixels(input: &FrameBuffer, output: &mut FrameBuffer, op: impl Fn(&mut [u8]) + Sync) -> Result<()> {
    ensure_compatible(input, output)?;
    let stride = input.stride();
    let row_bytes = input.row_bytes();
    let bpp = input.format.bytes_per_pixel();
    output
        .data_mut()
        .par_chunks_mut(stride)
        .zip(input.data().par_chunks(stride))
        .for_each(|(dst, src)| {
            dst[..row_bytes].copy_from_slice(&src[..row_bytes]);
            for px in dst[..row_bytes].chunks_exact_mut(bpp) {
                op(&mut px[..3]);
            }
        });
    Ok(())
}

/// Negative image.
pub struct Invert;

impl FilterInstance for Invert {
    fn name(&self) -> &str {
        "invert"
    }

    fn process(&self, _time: f64, input: &FrameBuffer, output: &mut FrameBuffer) -> Result<()> {
        map_pixels(input, output, |rgb| {
            for c in rgb {
                *c = 255 - *c;
            }
        })
    }
}

/// Rec. 601 luma.
pub struct Grayscale;

impl FilterInstance for Grayscale {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn process(&self, _time: f64, input: &FrameBuffer, output: &mut FrameBuffer) -> Result<()> {
        map_pixels(input, output, |rgb| {
            let luma = 0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32;
            let y = luma.round().min(255.0) as u8;
            rgb.fill(y);
        })
    }
}

/// Scales color channels by a constant factor.
pub struct Brightness {
    factor: f32,
}

impl Brightness {
    pub fn new(factor: f32) -> Self {
        Self {
            factor: factor.max(0.0),
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }
}

impl FilterInstance for Brightness {
    fn name(&self) -> &str {
        "brightness"
    }

    fn process(&self, _time: f64, input: &FrameBuffer, output: &mut FrameBuffer) -> Result<()> {
        let factor = self.factor;
        map_pixels(input, output, |rgb| {
            for c in rgb {
                *c = (*c as f32 * factor).round().min(255.0) as u8;
            }
        })
    }
}
