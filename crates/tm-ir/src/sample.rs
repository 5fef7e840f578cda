//! Sample data types.

use alloc::sync::Arc;
use arrayvec::ArrayString;

slotmap::new_key_type! {
    /// Key for referencing samples in the mixer's sample bank.
    pub struct SampleKey;
}

/// A sample definition.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Sample name
    pub name: ArrayString<22>,
    /// Audio data
    pub data: SampleData,
    /// Loop start position (in frames)
    pub loop_start: u32,
    /// Loop end position (in frames, exclusive)
    pub loop_end: u32,
    /// Loop type
    pub loop_type: LoopType,
    /// Default volume (0-64)
    pub volume: u8,
    /// Default panning (0-255, 128 = center)
    pub panning: u8,
    /// Finetune in 1/128 semitone steps
    pub finetune: i8,
    /// Transpose relative to the played note, in semitones
    pub relative_note: i8,
    /// Bank key assigned when the sample is registered with a mixer
    pub mixer_id: Option<SampleKey>,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            data: SampleData::Pcm8(Arc::from([])),
            loop_start: 0,
            loop_end: 0,
            loop_type: LoopType::None,
            volume: 64,
            panning: 128,
            finetune: 0,
            relative_note: 0,
            mixer_id: None,
        }
    }
}

impl Sample {
    /// Create a new empty sample.
    pub fn new(name: &str) -> Self {
        let mut sample = Self::default();
        let _ = sample.name.try_push_str(name);
        sample
    }

    /// Get the length of the sample in frames.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the sample has no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the sample has a usable loop.
    pub fn has_loop(&self) -> bool {
        self.loop_type != LoopType::None
            && self.loop_end > self.loop_start
            && self.loop_end as usize <= self.len()
    }

    /// Loop description handed to the mixer.
    pub fn sample_loop(&self) -> SampleLoop {
        if self.has_loop() {
            SampleLoop { kind: self.loop_type, start: self.loop_start, end: self.loop_end }
        } else {
            SampleLoop::NONE
        }
    }
}

/// Loop points and mode for mixer playback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleLoop {
    pub kind: LoopType,
    pub start: u32,
    pub end: u32,
}

impl SampleLoop {
    pub const NONE: SampleLoop = SampleLoop { kind: LoopType::None, start: 0, end: 0 };
}

/// Mono PCM sample data. Clones share the underlying buffer.
#[derive(Clone, Debug)]
pub enum SampleData {
    /// 8-bit samples
    Pcm8(Arc<[i8]>),
    /// 16-bit samples
    Pcm16(Arc<[i16]>),
}

impl SampleData {
    /// Get the number of sample frames.
    pub fn len(&self) -> usize {
        match self {
            SampleData::Pcm8(v) => v.len(),
            SampleData::Pcm16(v) => v.len(),
        }
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample value at a frame, scaled to 16 bits. Out of range reads 0.
    #[inline]
    pub fn get_mono(&self, pos: usize) -> i16 {
        match self {
            SampleData::Pcm8(v) => v.get(pos).copied().unwrap_or(0) as i16 * 256,
            SampleData::Pcm16(v) => v.get(pos).copied().unwrap_or(0),
        }
    }

    /// Linearly interpolated value between `pos` and `next`.
    ///
    /// `frac` is the 16-bit fractional position. `next` is passed in so
    /// loop wraparound can blend across the loop seam.
    #[inline]
    pub fn get_mono_interpolated(&self, pos: usize, next: usize, frac: u16) -> i16 {
        let a = self.get_mono(pos) as i32;
        let b = self.get_mono(next) as i32;
        (a + (((b - a) * frac as i32) >> 16)) as i16
    }
}

/// Sample loop type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopType {
    /// No loop
    #[default]
    None,
    /// Forward loop
    Forward,
    /// Ping-pong (bidirectional) loop
    PingPong,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn pcm8(data: &[i8]) -> SampleData {
        SampleData::Pcm8(Arc::from(data))
    }

    #[test]
    fn eight_bit_scales_to_sixteen() {
        let data = pcm8(&[0, 100, -128]);
        assert_eq!(data.get_mono(1), 25600);
        assert_eq!(data.get_mono(2), -32768);
        assert_eq!(data.get_mono(3), 0);
    }

    #[test]
    fn interpolated_at_integer_matches_nearest() {
        let data = pcm8(&[0, 100, -50, 30]);
        assert_eq!(data.get_mono_interpolated(1, 2, 0), data.get_mono(1));
    }

    #[test]
    fn interpolated_midpoint_averages_neighbors() {
        let data = pcm8(&[0, 100]);
        let mid = data.get_mono_interpolated(0, 1, 32768);
        assert!((mid as i32 - 12800).abs() <= 1);
    }

    #[test]
    fn interpolated_blends_across_loop_seam() {
        let data = SampleData::Pcm16(Arc::from(vec![1000i16, 2000, 3000]));
        // Last frame blends toward the loop start at frame 0.
        let v = data.get_mono_interpolated(2, 0, 32768);
        assert_eq!(v, 2000);
    }

    #[test]
    fn loop_requires_valid_range() {
        let mut sample = Sample::new("loop");
        sample.data = pcm8(&[0; 16]);
        sample.loop_type = LoopType::Forward;
        sample.loop_start = 4;
        sample.loop_end = 12;
        assert!(sample.has_loop());
        assert_eq!(sample.sample_loop().end, 12);

        sample.loop_end = 20;
        assert!(!sample.has_loop());
        assert_eq!(sample.sample_loop(), SampleLoop::NONE);
    }
}
