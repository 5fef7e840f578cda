//! Voice: one mixer playback slot.

use tm_ir::{LoopType, SampleData, SampleKey, SampleLoop};

use crate::config::Interpolation;

/// Fractional bits of a play position.
pub const FRAC_BITS: u32 = 16;

/// Peak amplitude of the synthetic sources.
pub const SYNTH_AMPLITUDE: i16 = 0x2000;

const FRAC_MASK: u64 = (1 << FRAC_BITS) - 1;

/// What a voice plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// A registered PCM sample
    Pcm { key: SampleKey, sample_loop: SampleLoop },
    /// Square wave; the first `duty / 256` of each cycle is high
    Psg { duty: u8 },
    /// 15-bit LFSR noise clocked once per cycle
    Noise { lfsr: u16 },
}

/// A mixer slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Voice {
    source: Option<Source>,
    /// Play position, 48.16 fixed point (frames for PCM, cycles for synths)
    position: u64,
    /// Position increment per output frame
    increment: u64,
    frequency: u32,
    /// 0..=256
    volume: u16,
    /// -128 (left) ..= 128 (right)
    panning: i16,
    /// Ping-pong direction
    forward: bool,
    active: bool,
    /// A one-shot sample ran past its end
    ended: bool,
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

impl Voice {
    pub const fn new() -> Self {
        Self {
            source: None,
            position: 0,
            increment: 0,
            frequency: 0,
            volume: 0,
            panning: 0,
            forward: true,
            active: false,
            ended: false,
        }
    }

    pub fn source(&self) -> Option<Source> {
        self.source
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn volume(&self) -> u16 {
        self.volume
    }

    pub fn panning(&self) -> i16 {
        self.panning
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whole-frame part of the play position.
    pub fn position_frames(&self) -> u64 {
        self.position >> FRAC_BITS
    }

    /// True if this voice plays the given sample.
    pub fn plays(&self, key: SampleKey) -> bool {
        matches!(self.source, Some(Source::Pcm { key: k, .. }) if k == key)
    }

    pub(crate) fn start(&mut self, source: Source, offset: u32) {
        self.source = Some(source);
        self.position = (offset as u64) << FRAC_BITS;
        self.forward = true;
        self.ended = false;
        self.active = true;
    }

    pub(crate) fn set_frequency(&mut self, hz: u32, sample_rate: u32) {
        self.frequency = hz;
        self.increment = ((hz as u64) << FRAC_BITS) / sample_rate.max(1) as u64;
    }

    pub(crate) fn set_volume(&mut self, volume: u16) {
        self.volume = volume.min(256);
    }

    pub(crate) fn set_panning(&mut self, panning: i16) {
        self.panning = panning.clamp(-128, 128);
    }

    /// Returns false if the voice cannot be activated.
    pub(crate) fn set_active(&mut self, active: bool) -> bool {
        if active && (self.source.is_none() || self.ended) {
            self.active = false;
            return false;
        }
        self.active = active;
        true
    }

    pub(crate) fn stop(&mut self) {
        self.active = false;
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::new();
    }

    /// Left and right gains, 0..=256 each.
    fn gains(&self) -> (i32, i32) {
        let right = self.panning as i32 + 128;
        let vol = self.volume as i32;
        (((256 - right) * vol) >> 8, (right * vol) >> 8)
    }

    /// Add this voice into the accumulators. `data` is the bank entry of a
    /// PCM source; a PCM voice without data stops.
    pub(crate) fn render(
        &mut self,
        data: Option<&SampleData>,
        interpolation: Interpolation,
        left: &mut [i32],
        right: &mut [i32],
    ) {
        if !self.active {
            return;
        }
        let (gain_l, gain_r) = self.gains();
        match self.source {
            Some(Source::Pcm { sample_loop, .. }) => {
                let Some(data) = data else {
                    self.active = false;
                    return;
                };
                for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                    let value = self.pcm_value(data, sample_loop, interpolation) as i32;
                    *l += (value * gain_l) >> 8;
                    *r += (value * gain_r) >> 8;
                    if !self.advance_pcm(data.len() as u64, sample_loop) {
                        break;
                    }
                }
            }
            Some(Source::Psg { duty }) => {
                let threshold = (duty as u64) << 8;
                for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                    let high = self.position & FRAC_MASK < threshold;
                    let value = i32::from(if high { SYNTH_AMPLITUDE } else { -SYNTH_AMPLITUDE });
                    *l += (value * gain_l) >> 8;
                    *r += (value * gain_r) >> 8;
                    self.position = self.position.wrapping_add(self.increment);
                }
            }
            Some(Source::Noise { mut lfsr }) => {
                for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                    let value = i32::from(if lfsr & 1 != 0 { SYNTH_AMPLITUDE } else { -SYNTH_AMPLITUDE });
                    *l += (value * gain_l) >> 8;
                    *r += (value * gain_r) >> 8;
                    let before = self.position >> FRAC_BITS;
                    self.position = self.position.wrapping_add(self.increment);
                    let clocks = (self.position >> FRAC_BITS).wrapping_sub(before).min(15);
                    for _ in 0..clocks {
                        lfsr = clock_lfsr(lfsr);
                    }
                }
                self.source = Some(Source::Noise { lfsr });
            }
            None => self.active = false,
        }
    }

    fn pcm_value(&self, data: &SampleData, sample_loop: SampleLoop, interpolation: Interpolation) -> i16 {
        let index = (self.position >> FRAC_BITS) as usize;
        match interpolation {
            Interpolation::Nearest => data.get_mono(index),
            Interpolation::Linear => {
                let next = match sample_loop.kind {
                    LoopType::Forward if index + 1 >= sample_loop.end as usize => sample_loop.start as usize,
                    LoopType::PingPong => (index + 1).min(sample_loop.end as usize - 1),
                    _ => (index + 1).min(data.len().saturating_sub(1)),
                };
                data.get_mono_interpolated(index, next, (self.position & FRAC_MASK) as u16)
            }
        }
    }

    /// Step one frame and apply the loop mode. Returns false once a one-shot
    /// sample has ended.
    fn advance_pcm(&mut self, len: u64, sample_loop: SampleLoop) -> bool {
        let start = (sample_loop.start as u64) << FRAC_BITS;
        let end = (sample_loop.end as u64) << FRAC_BITS;
        match sample_loop.kind {
            LoopType::None => {
                self.position += self.increment;
                if self.position >= len << FRAC_BITS {
                    self.active = false;
                    self.ended = true;
                    return false;
                }
            }
            LoopType::Forward => {
                self.position += self.increment;
                if self.position >= end {
                    self.position = start + (self.position - end) % (end - start);
                }
            }
            LoopType::PingPong => {
                let top = end - (1 << FRAC_BITS);
                if self.forward {
                    self.position += self.increment;
                    if self.position > top {
                        let over = self.position - top;
                        self.position = top.saturating_sub(over).max(start);
                        self.forward = false;
                    }
                } else if self.position >= start + self.increment {
                    self.position -= self.increment;
                } else {
                    let under = start + self.increment - self.position;
                    self.position = (start + under).min(top);
                    self.forward = true;
                }
            }
        }
        true
    }
}

/// One step of a 15-bit Fibonacci LFSR (taps 0 and 1).
#[inline]
fn clock_lfsr(lfsr: u16) -> u16 {
    let bit = (lfsr ^ (lfsr >> 1)) & 1;
    (lfsr >> 1) | (bit << 14)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use alloc::vec;
    use slotmap::SlotMap;

    fn key() -> SampleKey {
        let mut bank: SlotMap<SampleKey, ()> = SlotMap::with_key();
        bank.insert(())
    }

    fn pcm_voice(sample_loop: SampleLoop, step: u32) -> Voice {
        let mut v = Voice::new();
        v.start(Source::Pcm { key: key(), sample_loop }, 0);
        v.set_frequency(step, 1);
        v.set_volume(256);
        v
    }

    fn render(v: &mut Voice, data: &SampleData, frames: usize) -> (vec::Vec<i32>, vec::Vec<i32>) {
        let mut l = vec![0; frames];
        let mut r = vec![0; frames];
        v.render(Some(data), Interpolation::Nearest, &mut l, &mut r);
        (l, r)
    }

    fn ramp(len: i16) -> SampleData {
        SampleData::Pcm16(Arc::from((0..len).map(|i| i * 100).collect::<vec::Vec<_>>()))
    }

    #[test]
    fn centre_pan_splits_evenly() {
        let data = SampleData::Pcm16(Arc::from(vec![1000i16; 8]));
        let mut v = pcm_voice(SampleLoop::NONE, 1);
        let (l, r) = render(&mut v, &data, 4);
        assert_eq!(l, vec![500; 4]);
        assert_eq!(l, r);
    }

    #[test]
    fn hard_pan_is_one_sided() {
        let data = SampleData::Pcm16(Arc::from(vec![1000i16; 8]));
        let mut v = pcm_voice(SampleLoop::NONE, 1);
        v.set_panning(128);
        let (l, r) = render(&mut v, &data, 2);
        assert_eq!(l, vec![0; 2]);
        assert_eq!(r, vec![1000; 2]);
        v.set_panning(-500);
        assert_eq!(v.panning(), -128);
    }

    #[test]
    fn one_shot_ends_and_cannot_reactivate() {
        let data = ramp(4);
        let mut v = pcm_voice(SampleLoop::NONE, 1);
        let (l, _) = render(&mut v, &data, 8);
        assert_eq!(&l[4..], &[0, 0, 0, 0]);
        assert!(!v.is_active());
        assert!(!v.set_active(true));
    }

    #[test]
    fn forward_loop_wraps_to_start() {
        let data = ramp(6);
        let lp = SampleLoop { kind: LoopType::Forward, start: 2, end: 5 };
        let mut v = pcm_voice(lp, 1);
        let (l, _) = render(&mut v, &data, 9);
        let frames: vec::Vec<i32> = l.iter().map(|x| x * 2 / 100).collect();
        assert_eq!(frames, vec![0, 1, 2, 3, 4, 2, 3, 4, 2]);
        assert!(v.is_active());
    }

    #[test]
    fn ping_pong_reverses_at_both_ends() {
        let data = ramp(6);
        let lp = SampleLoop { kind: LoopType::PingPong, start: 1, end: 4 };
        let mut v = pcm_voice(lp, 1);
        let mut seen = vec::Vec::new();
        for _ in 0..10 {
            seen.push(v.position_frames());
            let mut l = [0];
            let mut r = [0];
            v.render(Some(&data), Interpolation::Nearest, &mut l, &mut r);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 2, 1, 2, 3, 2, 1]);
    }

    #[test]
    fn linear_interpolation_blends_neighbours() {
        let data = SampleData::Pcm16(Arc::from(vec![0i16, 1000, 1000]));
        let mut v = Voice::new();
        v.start(Source::Pcm { key: key(), sample_loop: SampleLoop::NONE }, 0);
        v.set_frequency(1, 2);
        v.set_volume(256);
        v.set_panning(128);
        let mut l = [0; 2];
        let mut r = [0; 2];
        v.render(Some(&data), Interpolation::Linear, &mut l, &mut r);
        assert_eq!(r, [0, 500]);
    }

    #[test]
    fn missing_bank_entry_stops_voice() {
        let mut v = pcm_voice(SampleLoop::NONE, 1);
        v.render(None, Interpolation::Linear, &mut [0; 4], &mut [0; 4]);
        assert!(!v.is_active());
    }

    #[test]
    fn psg_duty_cycle() {
        let mut v = Voice::new();
        v.start(Source::Psg { duty: 64 }, 0);
        v.set_frequency(1, 8);
        v.set_volume(256);
        v.set_panning(128);
        let mut l = [0; 8];
        let mut r = [0; 8];
        v.render(None, Interpolation::Linear, &mut l, &mut r);
        let high = r.iter().filter(|&&s| s > 0).count();
        assert_eq!(high, 2);
        assert!(r.iter().all(|&s| s.abs() == SYNTH_AMPLITUDE as i32));
    }

    #[test]
    fn noise_changes_state() {
        let mut v = Voice::new();
        v.start(Source::Noise { lfsr: 0x4001 }, 0);
        v.set_frequency(1, 1);
        v.set_volume(256);
        let mut l = [0; 32];
        let mut r = [0; 32];
        v.render(None, Interpolation::Linear, &mut l, &mut r);
        assert!(l.iter().any(|&s| s > 0) && l.iter().any(|&s| s < 0));
        assert_ne!(v.source(), Some(Source::Noise { lfsr: 0x4001 }));
    }

    #[test]
    fn lfsr_never_reaches_zero_from_nonzero() {
        let mut x = 1u16;
        for _ in 0..40_000 {
            x = clock_lfsr(x);
            assert_ne!(x, 0);
        }
    }
}
