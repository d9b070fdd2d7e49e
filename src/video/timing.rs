//! Exact frame timing.
//!
//! Presentation times are kept as the rational `index / fps` rather than as
//! accumulated floating point durations, so frame `n` of a long sequence lands
//! exactly where frame `0` plus `n` intervals says it should.

use std::fmt;
use std::time::Duration;

use crate::error::ValidationError;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Presentation time of one frame: `index / fps` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameTime {
    index: u64,
    fps: u32,
}

impl FrameTime {
    /// Time of frame `index` at `fps`; a zero rate has no frame times
    pub fn new(index: u64, fps: u32) -> Result<Self, ValidationError> {
        if fps == 0 {
            return Err(ValidationError::InvalidFrameRate { fps: 0 });
        }
        Ok(Self { index, fps })
    }

    /// Start of the timeline for a rate already checked to be non-zero
    pub(crate) fn zero(fps: u32) -> Self {
        debug_assert!(fps > 0);
        Self { index: 0, fps }
    }

    /// Frame index, which is also the timestamp in a `1/fps` timebase
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// The time as `(numerator, denominator)` seconds
    pub fn as_rational(&self) -> (u64, u32) {
        (self.index, self.fps)
    }

    /// Rescale to a timestamp in a `1/timebase` clock, rounding down
    pub fn rescale(&self, timebase: u32) -> u64 {
        ((self.index as u128 * timebase as u128) / self.fps as u128) as u64
    }

    /// Time of the following frame
    pub fn next(&self) -> Self {
        Self {
            index: self.index + 1,
            fps: self.fps,
        }
    }

    /// Nanosecond-exact duration, truncated below one nanosecond
    pub fn to_duration(&self) -> Duration {
        let fps = self.fps as u64;
        let whole = self.index / fps;
        let rem = (self.index % fps) as u128;
        Duration::from_secs(whole) + Duration::from_nanos((rem * NANOS_PER_SEC / fps as u128) as u64)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.index as f64 / self.fps as f64
    }
}

impl fmt::Display for FrameTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.index, self.fps)
    }
}

/// Hands out consecutive frame times at a fixed rate, starting at zero
#[derive(Debug, Clone)]
pub struct FrameClock {
    fps: u32,
    next: u64,
}

impl FrameClock {
    pub fn new(fps: u32) -> Result<Self, ValidationError> {
        if fps == 0 {
            return Err(ValidationError::InvalidFrameRate { fps: 0 });
        }
        Ok(Self { fps, next: 0 })
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Time of frame `index`
    pub fn at(&self, index: u64) -> FrameTime {
        FrameTime { index, fps: self.fps }
    }

    /// Total running time of `frames` frames
    pub fn duration_of(&self, frames: u64) -> FrameTime {
        self.at(frames)
    }
}

impl Iterator for FrameClock {
    type Item = FrameTime;

    fn next(&mut self) -> Option<FrameTime> {
        let time = self.at(self.next);
        self.next = self.next.checked_add(1)?;
        Some(time)
    }
}
