//! Software mixer: a fixed pool of voices rendered into 32-bit accumulators.

use alloc::vec::Vec;
use slotmap::SlotMap;
use tm_ir::{LoopType, SampleData, SampleKey, SampleLoop};

use crate::config::Interpolation;
use crate::voice::{Source, Voice};

/// Mixes up to `slot_count` voices. Voices are addressed by slot index;
/// PCM data lives in a sample bank keyed by [`SampleKey`].
pub struct SoftwareMixer {
    voices: Vec<Voice>,
    bank: SlotMap<SampleKey, SampleData>,
    sample_rate: u32,
    interpolation: Interpolation,
}

impl SoftwareMixer {
    pub fn new(slots: usize, sample_rate: u32, interpolation: Interpolation) -> Self {
        Self {
            voices: alloc::vec![Voice::new(); slots],
            bank: SlotMap::with_key(),
            sample_rate: sample_rate.max(1),
            interpolation,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.voices.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Number of samples in the bank.
    pub fn sample_count(&self) -> usize {
        self.bank.len()
    }

    pub fn voice(&self, slot: usize) -> Option<&Voice> {
        self.voices.get(slot)
    }

    /// Add sample data to the bank. The data buffer is shared, not copied.
    pub fn register_sample(&mut self, data: SampleData) -> SampleKey {
        self.bank.insert(data)
    }

    /// Remove a sample from the bank. Voices playing it are silenced.
    pub fn unregister_sample(&mut self, key: SampleKey) -> bool {
        if self.bank.remove(key).is_none() {
            return false;
        }
        for voice in self.voices.iter_mut().filter(|v| v.plays(key)) {
            voice.clear();
        }
        true
    }

    /// Start a slot on a registered sample at a frame offset. Loops that
    /// do not fit the sample play as one-shot.
    pub fn setup_pcm(&mut self, slot: usize, key: SampleKey, sample_loop: SampleLoop, offset: u32) -> bool {
        let Some(data) = self.bank.get(key) else {
            return false;
        };
        let len = data.len();
        if offset as usize >= len {
            return false;
        }
        let Some(voice) = self.voices.get_mut(slot) else {
            return false;
        };
        let fits = sample_loop.start < sample_loop.end && sample_loop.end as usize <= len;
        let sample_loop = if sample_loop.kind != LoopType::None && fits { sample_loop } else { SampleLoop::NONE };
        voice.start(Source::Pcm { key, sample_loop }, offset);
        true
    }

    /// Start a slot on a square wave with a duty of `duty / 256`.
    pub fn setup_psg(&mut self, slot: usize, duty: u8) -> bool {
        let Some(voice) = self.voices.get_mut(slot) else {
            return false;
        };
        voice.start(Source::Psg { duty }, 0);
        true
    }

    /// Start a slot on LFSR noise. A zero seed is replaced with 1.
    pub fn setup_noise(&mut self, slot: usize, seed: u16) -> bool {
        let Some(voice) = self.voices.get_mut(slot) else {
            return false;
        };
        let lfsr = match seed & 0x7FFF {
            0 => 1,
            s => s,
        };
        voice.start(Source::Noise { lfsr }, 0);
        true
    }

    /// Playback rate in Hz: sample frames per second for PCM, cycles per
    /// second for the synthetic sources.
    pub fn set_frequency(&mut self, slot: usize, hz: u32) -> bool {
        let sample_rate = self.sample_rate;
        self.with_voice(slot, |v| v.set_frequency(hz, sample_rate))
    }

    /// Volume 0..=256. Larger values are clamped.
    pub fn set_volume(&mut self, slot: usize, volume: u16) -> bool {
        self.with_voice(slot, |v| v.set_volume(volume))
    }

    /// Pan -128 (left) ..= 128 (right). Out-of-range values are clamped.
    pub fn set_panning(&mut self, slot: usize, panning: i16) -> bool {
        self.with_voice(slot, |v| v.set_panning(panning))
    }

    /// Returns false for an unknown slot, or when activating a slot with
    /// nothing to play.
    pub fn set_active(&mut self, slot: usize, active: bool) -> bool {
        self.voices.get_mut(slot).is_some_and(|v| v.set_active(active))
    }

    pub fn is_active(&self, slot: usize) -> bool {
        self.voices.get(slot).is_some_and(Voice::is_active)
    }

    /// Silence every slot.
    pub fn deactivate_all(&mut self) {
        for voice in &mut self.voices {
            voice.stop();
        }
    }

    /// Render `frames` frames of every active voice, adding into `left` and
    /// `right`. With `clear` the buffers are zeroed first. Returns the number
    /// of frames rendered, which is clamped to the shorter buffer.
    pub fn mix(&mut self, frames: usize, left: &mut [i32], right: &mut [i32], clear: bool) -> usize {
        let frames = frames.min(left.len()).min(right.len());
        let (left, right) = (&mut left[..frames], &mut right[..frames]);
        if clear {
            left.fill(0);
            right.fill(0);
        }
        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            let data = match voice.source() {
                Some(Source::Pcm { key, .. }) => self.bank.get(key),
                _ => None,
            };
            voice.render(data, self.interpolation, left, right);
        }
        frames
    }

    #[inline]
    fn with_voice(&mut self, slot: usize, f: impl FnOnce(&mut Voice)) -> bool {
        match self.voices.get_mut(slot) {
            Some(voice) => {
                f(voice);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use alloc::vec;

    fn dc(value: i16, len: usize) -> SampleData {
        SampleData::Pcm16(Arc::from(vec![value; len]))
    }

    fn mixer() -> SoftwareMixer {
        SoftwareMixer::new(4, 8, Interpolation::Nearest)
    }

    fn play(m: &mut SoftwareMixer, slot: usize, key: SampleKey) {
        assert!(m.setup_pcm(slot, key, SampleLoop::NONE, 0));
        m.set_frequency(slot, 8);
        m.set_volume(slot, 256);
    }

    #[test]
    fn clear_zeroes_before_mixing() {
        let mut m = mixer();
        let mut l = vec![7; 4];
        let mut r = vec![7; 4];
        assert_eq!(m.mix(4, &mut l, &mut r, true), 4);
        assert_eq!(l, vec![0; 4]);
        assert_eq!(r, vec![0; 4]);
    }

    #[test]
    fn no_clear_accumulates() {
        let mut m = mixer();
        let key = m.register_sample(dc(1000, 64));
        play(&mut m, 0, key);
        let mut l = vec![10; 4];
        let mut r = vec![10; 4];
        m.mix(4, &mut l, &mut r, false);
        assert_eq!(l, vec![510; 4]);
        assert_eq!(r, vec![510; 4]);
    }

    #[test]
    fn only_requested_frames_are_touched() {
        let mut m = mixer();
        let mut l = vec![3; 8];
        let mut r = vec![3; 8];
        assert_eq!(m.mix(2, &mut l, &mut r, true), 2);
        assert_eq!(l, vec![0, 0, 3, 3, 3, 3, 3, 3]);
    }

    #[test]
    fn zero_frames_without_clear_is_a_no_op() {
        let mut m = mixer();
        let key = m.register_sample(dc(1000, 64));
        play(&mut m, 0, key);
        let mut l = vec![5; 4];
        let mut r = vec![5; 4];
        assert_eq!(m.mix(0, &mut l, &mut r, false), 0);
        assert_eq!(l, vec![5; 4]);
        assert_eq!(r, vec![5; 4]);
        assert!(m.is_active(0));
    }

    #[test]
    fn frames_clamped_to_buffer() {
        let mut m = mixer();
        let mut l = vec![0; 3];
        let mut r = vec![0; 5];
        assert_eq!(m.mix(100, &mut l, &mut r, true), 3);
    }

    #[test]
    fn voices_sum() {
        let mut m = mixer();
        let key = m.register_sample(dc(1000, 64));
        play(&mut m, 0, key);
        play(&mut m, 3, key);
        let mut l = vec![0; 2];
        let mut r = vec![0; 2];
        m.mix(2, &mut l, &mut r, true);
        assert_eq!(l, vec![1000; 2]);
    }

    #[test]
    fn bad_slot_and_key_are_rejected() {
        let mut m = mixer();
        let key = m.register_sample(dc(1, 4));
        assert!(!m.setup_pcm(4, key, SampleLoop::NONE, 0));
        assert!(!m.set_volume(9, 10));
        assert!(!m.set_active(4, false));
        assert!(!m.setup_psg(4, 128));
        assert!(m.unregister_sample(key));
        assert!(!m.unregister_sample(key));
        assert!(!m.setup_pcm(0, key, SampleLoop::NONE, 0));
    }

    #[test]
    fn offset_past_end_is_rejected() {
        let mut m = mixer();
        let key = m.register_sample(dc(1, 4));
        assert!(!m.setup_pcm(0, key, SampleLoop::NONE, 4));
        assert!(m.setup_pcm(0, key, SampleLoop::NONE, 3));
    }

    #[test]
    fn unregister_silences_voices() {
        let mut m = mixer();
        let key = m.register_sample(dc(1000, 64));
        play(&mut m, 1, key);
        assert!(m.is_active(1));
        m.unregister_sample(key);
        assert!(!m.is_active(1));
        assert!(!m.set_active(1, true));
    }

    #[test]
    fn oversized_loop_plays_one_shot() {
        let mut m = mixer();
        let key = m.register_sample(dc(1, 4));
        let lp = SampleLoop { kind: LoopType::Forward, start: 0, end: 10 };
        assert!(m.setup_pcm(0, key, lp, 0));
        assert!(matches!(
            m.voice(0).and_then(Voice::source),
            Some(Source::Pcm { sample_loop: SampleLoop::NONE, .. })
        ));
    }

    #[test]
    fn inactive_voices_are_silent() {
        let mut m = mixer();
        let key = m.register_sample(dc(1000, 64));
        play(&mut m, 0, key);
        m.set_active(0, false);
        let mut l = vec![0; 4];
        let mut r = vec![0; 4];
        m.mix(4, &mut l, &mut r, true);
        assert_eq!(l, vec![0; 4]);
        assert!(m.set_active(0, true));
    }

    #[test]
    fn noise_seed_zero_is_replaced() {
        let mut m = mixer();
        assert!(m.setup_noise(2, 0));
        assert_eq!(m.voice(2).and_then(Voice::source), Some(Source::Noise { lfsr: 1 }));
    }

    #[test]
    fn frequency_sets_increment() {
        let mut m = SoftwareMixer::new(1, 44100, Interpolation::Nearest);
        let key = m.register_sample(dc(1, 100_000));
        m.setup_pcm(0, key, SampleLoop::NONE, 0);
        m.set_frequency(0, 22050);
        m.set_volume(0, 256);
        let mut l = vec![0; 10];
        let mut r = vec![0; 10];
        m.mix(10, &mut l, &mut r, true);
        assert_eq!(m.voice(0).map(Voice::position_frames), Some(5));
        assert_eq!(m.voice(0).map(Voice::frequency), Some(22050));
    }
}
