//! Frame buffer types for video frames in CPU memory.
//!
//! Decoders write straight into these buffers and the compositor reads them
//! back, so the layout is a single packed plane with a 64-byte aligned stride.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ReelflowError, Result};

/// Pixel format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGB (24 bits per pixel), no alpha
    Rgb24,
    /// 8-bit RGBA (32 bits per pixel)
    #[default]
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Rgba8 => 4,
        }
    }

    /// Whether pixels carry an alpha channel.
    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba8)
    }

    /// Bytes needed for a tightly packed frame of this format.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

/// One RGBA pixel, castable from raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const BLACK: Self = Self::opaque(0, 0, 0);
    pub const WHITE: Self = Self::opaque(255, 255, 255);
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Fully opaque color.
    #[inline]
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// A video frame in CPU memory.
///
/// `position` records which source or timeline frame the pixels belong to.
/// Producers stamp it, consumers use it to check ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    /// Pixel format
    pub format: PixelFormat,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame this buffer was filled for, if any
    pub position: Option<i64>,
    stride: usize,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Create a zeroed frame buffer with the given dimensions and format.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        // Align stride to 64 bytes for SIMD friendly row access
        let min_stride = width as usize * format.bytes_per_pixel();
        let stride = (min_stride + 63) & !63;
        Self {
            format,
            width,
            height,
            position: None,
            stride,
            data: vec![0u8; stride * height as usize],
        }
    }

    /// Create an opaque black frame.
    pub fn blank(width: u32, height: u32, format: PixelFormat) -> Self {
        let mut frame = Self::new(width, height, format);
        frame.fill(Rgba8::BLACK);
        frame
    }

    /// Bytes per row including padding.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes per row holding pixel data.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Number of pixels in the frame.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Total memory usage of this frame in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len()
    }

    /// Raw bytes, rows separated by `stride`.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes, mutably.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get a row of pixel data.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    /// Get a mutable row of pixel data.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let len = self.row_bytes();
        &mut self.data[start..start + len]
    }

    /// A row viewed as RGBA pixels. `None` for formats without alpha.
    pub fn rgba_row(&self, y: u32) -> Option<&[Rgba8]> {
        match self.format {
            PixelFormat::Rgba8 => Some(bytemuck::cast_slice(self.row(y))),
            PixelFormat::Rgb24 => None,
        }
    }

    /// Mutable RGBA view of a row. `None` for formats without alpha.
    pub fn rgba_row_mut(&mut self, y: u32) -> Option<&mut [Rgba8]> {
        match self.format {
            PixelFormat::Rgba8 => Some(bytemuck::cast_slice_mut(self.row_mut(y))),
            PixelFormat::Rgb24 => None,
        }
    }

    /// Read one pixel. RGB frames report an opaque alpha.
    pub fn pixel(&self, x: u32, y: u32) -> Rgba8 {
        let bpp = self.format.bytes_per_pixel();
        let px = &self.row(y)[x as usize * bpp..(x as usize + 1) * bpp];
        match self.format {
            PixelFormat::Rgba8 => Rgba8::new(px[0], px[1], px[2], px[3]),
            PixelFormat::Rgb24 => Rgba8::opaque(px[0], px[1], px[2]),
        }
    }

    /// Write one pixel. Alpha is dropped for RGB frames.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgba8) {
        let bpp = self.format.bytes_per_pixel();
        let px = &mut self.row_mut(y)[x as usize * bpp..(x as usize + 1) * bpp];
        px[0] = color.r;
        px[1] = color.g;
        px[2] = color.b;
        if bpp == 4 {
            px[3] = color.a;
        }
    }

    /// Fill every pixel with one color.
    pub fn fill(&mut self, color: Rgba8) {
        let bpp = self.format.bytes_per_pixel();
        let pattern = [color.r, color.g, color.b, color.a];
        for y in 0..self.height {
            for px in self.row_mut(y).chunks_exact_mut(bpp) {
                px.copy_from_slice(&pattern[..bpp]);
            }
        }
    }

    /// Whether `other` has the same dimensions and pixel format.
    pub fn is_compatible(&self, other: &FrameBuffer) -> bool {
        self.format == other.format && self.width == other.width && self.height == other.height
    }

    /// Copy pixels and position from a compatible frame without reallocating.
    pub fn copy_from(&mut self, other: &FrameBuffer) -> Result<()> {
        if !self.is_compatible(other) {
            return Err(ReelflowError::InvalidParameter(format!(
                "cannot copy {}x{} {:?} frame into {}x{} {:?} frame",
                other.width, other.height, other.format, self.width, self.height, self.format
            )));
        }
        self.data.copy_from_slice(&other.data);
        self.position = other.position;
        Ok(())
    }
}

/// Arc-wrapped frame buffer for shared ownership.
pub type SharedFrameBuffer = Arc<FrameBuffer>;
