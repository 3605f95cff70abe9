use reelflow_core::{FrameBuffer, Result};

use super::blend_rows;
use crate::mixer::MixerInstance;

/// Linear fade from the bottom layer to the top one.
pub struct CrossDissolve;

impl MixerInstance for CrossDissolve {
    fn name(&self) -> &str {
        "cross_dissolve"
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
        let ip = 1.0 - p;
        blend_rows(bottom, top, output, |a, b, out| {
            for ((o, a), b) in out.iter_mut().zip(a).zip(b) {
                *o = (*a as f32 * ip + *b as f32 * p).round() as u8;
            }
        })
    }
}
