//! Audio frame type.

/// A stereo audio frame (16-bit integer).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0, right: 0 }
    }

    /// Narrow a pair of mixer accumulators, scaling by `master` (256 = unity).
    #[inline]
    pub fn from_accumulators(left: i32, right: i32, master: u16) -> Self {
        Self {
            left: narrow(left, master),
            right: narrow(right, master),
        }
    }

    /// Average of both channels.
    #[inline]
    pub fn mono(&self) -> i16 {
        ((self.left as i32 + self.right as i32) / 2) as i16
    }
}

/// Scale an accumulator by `master / 256` and clamp to 16 bits.
#[inline]
pub fn narrow(acc: i32, master: u16) -> i16 {
    ((acc as i64 * master as i64) >> 8).clamp(i16::MIN as i64, i16::MAX as i64) as i16
}
