//! Built-in mixers.

mod cross_dissolve;
mod dip_to_black;

pub use cross_dissolve::CrossDissolve;
pub use dip_to_black::DipToBlack;

use rayon::prelude::*;
use reelflow_core::{FrameBuffer, Result};

use crate::ensure_compatible;

/// Blend two layers row by row. `op` gets the bottom, top and output bytes
/// of one row.
pub(crate) fn blend_rows(
    bottom: &FrameBuffer,
    top: &FrameBuffer,
    output: &mut FrameBuffer,
    op: impl Fn(&[u8], &[u8], &mut [u8]) + Sync,
) -> Result<()> {
    ensure_compatible(bottom, top)?;
    ensure_compatible(bottom, output)?;
    let stride = bottom.stride();
    let row_bytes = bottom.row_bytes();
    output
        .data_mut()
        .par_chunks_mut(stride)
        .zip(bottom.data().par_chunks(stride))
        .zip(top.data().par_chunks(stride))
        .for_each(|((dst, a), b)| op(&a[..row_bytes], &b[..row_bytes], &mut dst[..row_bytes]));
    Ok(())
}
