//! Time representation for frame-accurate playback
//!
//! Timeline positions are integer frame numbers. Rational arithmetic is used
//! whenever a frame has to be turned into seconds (effects are driven by
//! time), so long timelines do not accumulate floating-point drift.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A rational time value in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RationalTime {
    value: Rational64,
}

impl RationalTime {
    /// Zero time constant.
    pub const ZERO: Self = Self {
        value: Rational64::new_raw(0, 1),
    };

    /// `numerator / denominator` seconds.
    #[inline]
    pub fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            value: Rational64::new(numerator, denominator),
        }
    }

    /// Create a RationalTime from a frame number and frame rate.
    #[inline]
    pub fn from_frames(frames: i64, rate: FrameRate) -> Self {
        Self {
            value: Rational64::new(frames * rate.denominator as i64, rate.numerator as i64),
        }
    }

    /// Convert to seconds as f64.
    #[inline]
    pub fn to_seconds_f64(self) -> f64 {
        *self.value.numer() as f64 / *self.value.denom() as f64
    }

    /// Convert to frame number at the given frame rate (floored).
    #[inline]
    pub fn to_frames(self, rate: FrameRate) -> i64 {
        let frames = self.value * Rational64::new(rate.numerator as i64, rate.denominator as i64);
        frames.floor().to_integer()
    }
}

impl Default for RationalTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for RationalTime {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
        }
    }
}

impl Sub for RationalTime {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            value: self.value - rhs.value,
        }
    }
}

impl fmt::Display for RationalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.to_seconds_f64())
    }
}

/// Frame rate as a rational number (e.g., 24000/1001 for 23.976 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g., 24000)
    pub numerator: u32,
    /// Denominator (e.g., 1001)
    pub denominator: u32,
}

impl FrameRate {
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Presentation time of a frame, in seconds.
    #[inline]
    pub fn frame_time(self, frame: i64) -> f64 {
        RationalTime::from_frames(frame, self).to_seconds_f64()
    }

    /// Whether both terms are non-zero.
    pub fn is_valid(self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_25
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}

/// A half-open range of frames, `[start, end)`.
///
/// An `end` of `None` leaves the range open towards the end of the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: i64,
    pub end: Option<i64>,
}

impl FrameRange {
    #[inline]
    pub const fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Range starting at `start` that never ends.
    #[inline]
    pub const fn open(start: i64) -> Self {
        Self { start, end: None }
    }

    /// Range covering every frame.
    pub const ALL: Self = Self::open(0);

    #[inline]
    pub fn contains(self, frame: i64) -> bool {
        frame >= self.start && self.end.map_or(true, |end| frame < end)
    }

    /// Number of frames, `None` for open ranges.
    #[inline]
    pub fn len(self) -> Option<i64> {
        self.end.map(|end| (end - self.start).max(0))
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.len() == Some(0)
    }

    /// Check if two ranges share at least one frame.
    pub fn overlaps(self, other: Self) -> bool {
        let before_other_ends = other.end.map_or(true, |end| self.start < end);
        let other_before_self_ends = self.end.map_or(true, |end| other.start < end);
        !self.is_empty() && !other.is_empty() && before_other_ends && other_before_self_ends
    }

    /// How far `frame` is into the range, from 0.0 to 1.0.
    ///
    /// Open ranges report 0.0.
    pub fn progress(self, frame: i64) -> f32 {
        match self.len() {
            Some(len) if len > 0 => ((frame - self.start) as f32 / len as f32).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}
