//! Stream adapter: drives the sequencer at tick boundaries and narrows
//! mixer output for a pull-based audio callback.

use alloc::vec;
use alloc::vec::Vec;

use crate::frame::{narrow, Frame};
use crate::mixer::SoftwareMixer;
use crate::sequencer::TickSequencer;

/// Converts a sequencer and mixer pair into a sample stream.
///
/// A tick lasts `sample_rate * 2.5 / tempo` frames. The fractional part is
/// carried from tick to tick, so tick boundaries never drift.
pub struct StreamAdapter {
    sample_rate: u32,
    master_volume: u16,
    /// Frames left before the next tick is processed
    samples_until_tick: u32,
    /// Carried remainder of the tick length division
    remainder: u32,
    left: Vec<i32>,
    right: Vec<i32>,
}

impl StreamAdapter {
    /// `block_frames` bounds how much is mixed per pass.
    pub fn new(sample_rate: u32, block_frames: usize, master_volume: u16) -> Self {
        let block = block_frames.max(1);
        Self {
            sample_rate: sample_rate.max(1),
            master_volume,
            samples_until_tick: 0,
            remainder: 0,
            left: vec![0; block],
            right: vec![0; block],
        }
    }

    /// Restart tick timing; the next frame begins a tick.
    pub fn reset(&mut self) {
        self.samples_until_tick = 0;
        self.remainder = 0;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn master_volume(&self) -> u16 {
        self.master_volume
    }

    /// 256 = unity.
    pub fn set_master_volume(&mut self, volume: u16) {
        self.master_volume = volume;
    }

    pub fn block_frames(&self) -> usize {
        self.left.len()
    }

    /// Length of the next tick in frames at `tempo` BPM.
    pub fn next_tick_length(&mut self, tempo: u8) -> u32 {
        let divisor = tempo.max(1) as u32 * 2;
        let total = self.sample_rate * 5 + self.remainder;
        self.remainder = total % divisor;
        total / divisor
    }

    /// Render into separate left and right buffers. Returns the number of
    /// frames written, the length of the shorter buffer.
    pub fn fill_buffer(
        &mut self,
        seq: &mut TickSequencer,
        mixer: &mut SoftwareMixer,
        left: &mut [i16],
        right: &mut [i16],
    ) -> usize {
        let frames = left.len().min(right.len());
        let master = self.master_volume;
        self.render(seq, mixer, frames, |at, l, r| {
            for (i, (&a, &b)) in l.iter().zip(r).enumerate() {
                left[at + i] = narrow(a, master);
                right[at + i] = narrow(b, master);
            }
        })
    }

    /// Render interleaved samples for `channels` output channels. Mono
    /// averages left and right; channels past the second are silent.
    /// Returns the number of frames written.
    pub fn fill_buffer_interleaved(
        &mut self,
        seq: &mut TickSequencer,
        mixer: &mut SoftwareMixer,
        out: &mut [i16],
        channels: u16,
    ) -> usize {
        let channels = channels.max(1) as usize;
        let frames = out.len() / channels;
        let master = self.master_volume;
        self.render(seq, mixer, frames, |at, l, r| {
            for (i, (&a, &b)) in l.iter().zip(r).enumerate() {
                let frame = Frame::from_accumulators(a, b, master);
                let dst = &mut out[(at + i) * channels..(at + i + 1) * channels];
                match dst {
                    [mono] => *mono = frame.mono(),
                    [l, r, rest @ ..] => {
                        *l = frame.left;
                        *r = frame.right;
                        rest.fill(0);
                    }
                    [] => {}
                }
            }
        })
    }

    /// Render stereo frames.
    pub fn fill_frames(&mut self, seq: &mut TickSequencer, mixer: &mut SoftwareMixer, out: &mut [Frame]) -> usize {
        let master = self.master_volume;
        let frames = out.len();
        self.render(seq, mixer, frames, |at, l, r| {
            for (i, (&a, &b)) in l.iter().zip(r).enumerate() {
                out[at + i] = Frame::from_accumulators(a, b, master);
            }
        })
    }

    /// Mix `frames` frames in passes that never cross a tick boundary,
    /// processing a tick wherever one starts. `sink` receives the frame
    /// offset of each pass and its accumulators.
    fn render(
        &mut self,
        seq: &mut TickSequencer,
        mixer: &mut SoftwareMixer,
        frames: usize,
        mut sink: impl FnMut(usize, &[i32], &[i32]),
    ) -> usize {
        let mut done = 0;
        while done < frames {
            if self.samples_until_tick == 0 {
                seq.process_tick(mixer);
                self.samples_until_tick = self.next_tick_length(seq.tempo()).max(1);
            }
            let n = (frames - done).min(self.left.len()).min(self.samples_until_tick as usize);
            let n = mixer.mix(n, &mut self.left, &mut self.right, true);
            sink(done, &self.left[..n], &self.right[..n]);
            done += n;
            self.samples_until_tick -= n as u32;
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Interpolation;
    use alloc::sync::Arc;
    use tm_ir::{SampleData, SampleLoop};

    fn idle() -> (TickSequencer, SoftwareMixer) {
        (TickSequencer::new(), SoftwareMixer::new(4, 44100, Interpolation::Nearest))
    }

    #[test]
    fn tick_length_at_125_bpm() {
        let mut s = StreamAdapter::new(44100, 512, 256);
        assert_eq!(s.next_tick_length(125), 882);
        assert_eq!(s.next_tick_length(125), 882);
    }

    #[test]
    fn remainder_is_carried() {
        let mut s = StreamAdapter::new(44100, 512, 256);
        let total: u32 = (0..256).map(|_| s.next_tick_length(128)).sum();
        assert_eq!(total, 44100 * 5);
        let lengths: Vec<u32> = (0..4).map(|_| s.next_tick_length(128)).collect();
        assert!(lengths.iter().all(|&l| l == 861 || l == 862));
    }

    #[test]
    fn stopped_sequencer_renders_silence() {
        let (mut seq, mut mixer) = idle();
        let mut s = StreamAdapter::new(44100, 64, 256);
        let mut l = vec![1i16; 300];
        let mut r = vec![1i16; 200];
        assert_eq!(s.fill_buffer(&mut seq, &mut mixer, &mut l, &mut r), 200);
        assert!(l[..200].iter().all(|&x| x == 0));
        assert_eq!(l[200], 1);
    }

    fn dc_mixer(value: i16) -> SoftwareMixer {
        let mut mixer = SoftwareMixer::new(4, 44100, Interpolation::Nearest);
        let key = mixer.register_sample(SampleData::Pcm16(Arc::from(vec![value; 1000])));
        mixer.setup_pcm(0, key, SampleLoop::NONE, 0);
        mixer.set_frequency(0, 44100);
        mixer.set_volume(0, 256);
        mixer.set_panning(0, 128);
        mixer
    }

    #[test]
    fn interleaved_layouts() {
        let mut seq = TickSequencer::new();
        let mut s = StreamAdapter::new(44100, 16, 256);

        let mut mixer = dc_mixer(1000);
        let mut stereo = vec![7i16; 8];
        assert_eq!(s.fill_buffer_interleaved(&mut seq, &mut mixer, &mut stereo, 2), 4);
        assert_eq!(stereo, vec![0, 1000, 0, 1000, 0, 1000, 0, 1000]);

        let mut mixer = dc_mixer(1000);
        let mut mono = vec![7i16; 4];
        assert_eq!(s.fill_buffer_interleaved(&mut seq, &mut mixer, &mut mono, 1), 4);
        assert_eq!(mono, vec![500; 4]);

        let mut mixer = dc_mixer(1000);
        let mut quad = vec![7i16; 9];
        assert_eq!(s.fill_buffer_interleaved(&mut seq, &mut mixer, &mut quad, 4), 2);
        assert_eq!(quad, vec![0, 1000, 0, 0, 0, 1000, 0, 0, 7]);
    }

    #[test]
    fn master_volume_applies() {
        let mut seq = TickSequencer::new();
        let mut mixer = dc_mixer(1000);
        let mut s = StreamAdapter::new(44100, 16, 128);
        let mut frames = [Frame::silence(); 3];
        assert_eq!(s.fill_frames(&mut seq, &mut mixer, &mut frames), 3);
        assert_eq!(frames[2], Frame { left: 0, right: 500 });
    }

    #[test]
    fn blocks_larger_than_scratch_are_split() {
        let mut seq = TickSequencer::new();
        let mut mixer = dc_mixer(1000);
        let mut s = StreamAdapter::new(44100, 7, 256);
        let mut l = vec![0i16; 100];
        let mut r = vec![0i16; 100];
        assert_eq!(s.fill_buffer(&mut seq, &mut mixer, &mut l, &mut r), 100);
        assert!(r.iter().all(|&x| x == 1000));
    }
}
