//! Channel state for tracker playback.

use tm_ir::{AutoVibrato, Instrument};

use crate::effect_memory::EffectMemory;
use crate::envelope_state::{EnvelopeCursor, PAN_NEUTRAL, VOLUME_NEUTRAL};
use crate::frequency::{clamp_period, FrequencyTables};
use crate::waveform::Oscillator;

/// Fadeout level of a note that has not been released.
pub const FADEOUT_FULL: u16 = 32768;

/// Maximum channel volume.
pub const MAX_VOLUME: u8 = 64;

/// Instrument auto-vibrato progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AutoVibratoState {
    pub pos: u8,
    /// Depth in 1/256 units
    pub amp: u16,
    /// Sweep increment per tick; 0 once the full depth is reached
    pub step: u16,
}

impl AutoVibratoState {
    /// Restart on note trigger.
    pub fn reset(&mut self, vibrato: &AutoVibrato) {
        self.pos = 0;
        if vibrato.sweep != 0 {
            self.amp = 0;
            self.step = ((vibrato.depth as u16) << 8) / vibrato.sweep as u16;
        } else {
            self.amp = (vibrato.depth as u16) << 8;
            self.step = 0;
        }
    }

    /// Period delta for this tick, then advance.
    pub fn step(&mut self, vibrato: &AutoVibrato, key_on: bool, tables: &FrequencyTables) -> i32 {
        if vibrato.depth == 0 || vibrato.rate == 0 {
            return 0;
        }
        if self.step != 0 && key_on {
            self.amp = self.amp.saturating_add(self.step);
            if self.amp >> 8 > vibrato.depth as u16 {
                self.amp = (vibrato.depth as u16) << 8;
                self.step = 0;
            }
        }
        self.pos = self.pos.wrapping_add(vibrato.rate);
        let half = (self.pos >> 1) as i32;
        let value: i32 = match vibrato.waveform {
            1 => {
                if self.pos > 127 {
                    64
                } else {
                    -64
                }
            }
            2 => ((half + 64) & 127) - 64,
            3 => ((-half + 64) & 127) - 64,
            _ => tables.auto_vibrato_sine(self.pos) as i32,
        };
        ((value << 2) * self.amp as i32) >> 16
    }
}

/// Runtime state of one tracker channel.
///
/// The instrument and sample are indices into the playing song.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    /// Channel drives its mixer slot
    pub active: bool,
    /// False after note-off
    pub key_on: bool,
    /// Last triggered note (1-96)
    pub note: u8,
    /// Zero-based instrument index
    pub instrument: Option<u8>,
    /// Index into the instrument's sample list
    pub sample: Option<u8>,
    /// Finetune of the playing sample, overridable by E5x
    pub finetune: i8,
    /// Persistent period, moved by slides
    pub base_period: u16,
    /// Output period for this tick (vibrato and arpeggio applied)
    pub period: u16,
    /// Tone portamento destination
    pub target_period: u16,
    /// Channel volume (0-64)
    pub volume: u8,
    /// Output volume for this tick (tremolo and tremor applied)
    pub out_volume: u8,
    /// Channel panning (0-255, 128 = center)
    pub panning: u8,
    /// Fadeout level, 32768 = full
    pub fadeout: u16,
    pub memory: EffectMemory,
    pub volume_envelope: EnvelopeCursor,
    pub panning_envelope: EnvelopeCursor,
    pub vibrato: Oscillator,
    pub tremolo: Oscillator,
    pub auto_vibrato: AutoVibratoState,

    /// E60 row
    pub loop_row: u16,
    /// Remaining E6x repetitions, 0 when not looping
    pub loop_count: u8,
    /// Position in the tremor on/off cycle
    pub tremor_pos: u8,
    /// Ticks since the last multi-retrig
    pub retrig_count: u8,
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel {
    pub const fn new() -> Self {
        Self {
            active: false,
            key_on: false,
            note: 0,
            instrument: None,
            sample: None,
            finetune: 0,
            base_period: 0,
            period: 0,
            target_period: 0,
            volume: 0,
            out_volume: 0,
            panning: 128,
            fadeout: FADEOUT_FULL,
            memory: EffectMemory::new(),
            volume_envelope: EnvelopeCursor::new(VOLUME_NEUTRAL),
            panning_envelope: EnvelopeCursor::new(PAN_NEUTRAL),
            vibrato: Oscillator::new(),
            tremolo: Oscillator::new(),
            auto_vibrato: AutoVibratoState { pos: 0, amp: 0, step: 0 },
            loop_row: 0,
            loop_count: 0,
            tremor_pos: 0,
            retrig_count: 0,
        }
    }

    /// Return to the power-on state, forgetting effect memory.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Restart envelopes, fadeout and auto-vibrato for a new note.
    pub fn restart_instrument(&mut self, instrument: &Instrument) {
        self.key_on = true;
        self.fadeout = FADEOUT_FULL;
        self.volume_envelope.reset(&instrument.volume_envelope);
        self.panning_envelope.reset(&instrument.panning_envelope);
        self.auto_vibrato.reset(&instrument.vibrato);
        self.vibrato.retrigger();
        self.tremolo.retrigger();
        self.tremor_pos = 0;
        self.retrig_count = 0;
    }

    /// Release the key. Without a volume envelope the note is silenced.
    pub fn key_off(&mut self, instrument: Option<&Instrument>) {
        self.key_on = false;
        if !instrument.is_some_and(|i| i.volume_envelope.is_active()) {
            self.volume = 0;
        }
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
    }

    pub fn add_volume(&mut self, delta: i16) {
        self.volume = (self.volume as i16 + delta).clamp(0, MAX_VOLUME as i16) as u8;
    }

    /// Axy: up by x if x is nonzero, otherwise down by y.
    pub fn slide_volume(&mut self, param: u8) {
        let up = param >> 4;
        if up != 0 {
            self.add_volume(up as i16);
        } else {
            self.add_volume(-((param & 0x0F) as i16));
        }
    }

    pub fn add_panning(&mut self, delta: i16) {
        self.panning = (self.panning as i16 + delta).clamp(0, 255) as u8;
    }

    /// Pxy: right by x if x is nonzero, otherwise left by y.
    pub fn slide_panning(&mut self, param: u8) {
        let right = param >> 4;
        if right != 0 {
            self.add_panning(right as i16);
        } else {
            self.add_panning(-((param & 0x0F) as i16));
        }
    }

    /// Move the base period. Negative raises the pitch. No-op before the
    /// first note.
    pub fn slide_period(&mut self, delta: i32) {
        if self.base_period == 0 {
            return;
        }
        self.base_period = clamp_period(self.base_period as i32 + delta);
    }

    /// Move the base period toward the tone portamento target.
    pub fn tone_porta(&mut self, speed: u16) {
        if self.target_period == 0 || self.base_period == self.target_period {
            return;
        }
        let speed = speed as i32;
        let current = self.base_period as i32;
        let target = self.target_period as i32;
        self.base_period = if current < target {
            (current + speed).min(target) as u16
        } else {
            (current - speed).max(target) as u16
        };
    }

    /// Vibrato: period delta from the oscillator, speed in the high nibble.
    pub fn vibrato_delta(&mut self, param: u8) -> i32 {
        self.vibrato.step((param >> 4) * 4, param & 0x0F, 32) as i32
    }

    /// Tremolo: set the output volume from the oscillator.
    pub fn apply_tremolo(&mut self, param: u8) {
        let delta = self.tremolo.step((param >> 4) * 4, param & 0x0F, 64);
        self.out_volume = (self.volume as i16 + delta).clamp(0, MAX_VOLUME as i16) as u8;
    }

    /// Txy: on for x+1 ticks, off for y+1 ticks.
    pub fn apply_tremor(&mut self, param: u8) {
        let on = (param >> 4) + 1;
        let off = (param & 0x0F) + 1;
        if self.tremor_pos >= on {
            self.out_volume = 0;
        }
        self.tremor_pos = (self.tremor_pos + 1) % (on + off);
    }

    /// Volume change applied by a multi-retrig, indexed by the x nibble.
    pub fn multi_retrig_volume(&mut self, x: u8) {
        let v = self.volume as i16;
        let volume = match x {
            1..=5 => v - (1 << (x - 1)),
            6 => (v >> 1) + (v >> 3) + (v >> 4),
            7 => v >> 1,
            9..=0x0D => v + (1 << (x - 9)),
            0x0E => (v * 3) >> 1,
            0x0F => v * 2,
            _ => v,
        };
        self.volume = volume.clamp(0, MAX_VOLUME as i16) as u8;
    }

    /// Advance envelopes and fadeout by one tick.
    pub fn advance_instrument(&mut self, instrument: &Instrument) {
        self.volume_envelope.advance(&instrument.volume_envelope, self.key_on);
        self.panning_envelope.advance(&instrument.panning_envelope, self.key_on);
        if !self.key_on {
            self.fadeout = self.fadeout.saturating_sub(instrument.fadeout);
        }
    }

    /// Mixer volume 0..=256 for a global volume of 0..=64.
    pub fn final_volume(&self, global_volume: u8) -> u16 {
        let env = self.volume_envelope.value().min(64) as u32;
        let vol = self.out_volume.min(MAX_VOLUME) as u32;
        let mixed = (env * vol * self.fadeout as u32) >> 18;
        ((global_volume.min(64) as u32 * mixed) >> 7) as u16
    }

    /// Panning 0..=255 with the panning envelope applied.
    pub fn final_panning(&self) -> u8 {
        let pan = self.panning as i32;
        let env = self.panning_envelope.value().min(64) as i32 - 32;
        let room = 128 - (pan - 128).abs();
        (pan + env * room / 32).clamp(0, 255) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_ir::Envelope;

    fn playing(volume: u8) -> Channel {
        let mut ch = Channel::new();
        ch.restart_instrument(&Instrument::new("i"));
        ch.set_volume(volume);
        ch.out_volume = ch.volume;
        ch.volume_envelope.advance(&Envelope::new(), true);
        ch
    }

    #[test]
    fn full_scale_is_256() {
        let ch = playing(64);
        assert_eq!(ch.final_volume(64), 256);
        assert_eq!(ch.final_volume(32), 128);
        assert_eq!(playing(32).final_volume(64), 128);
        assert_eq!(playing(0).final_volume(64), 0);
    }

    #[test]
    fn volume_slide_prefers_up() {
        let mut ch = playing(10);
        ch.slide_volume(0x23);
        assert_eq!(ch.volume, 12);
        ch.slide_volume(0x03);
        assert_eq!(ch.volume, 9);
        ch.slide_volume(0x0F);
        ch.slide_volume(0x0F);
        assert_eq!(ch.volume, 0);
        ch.slide_volume(0xF0);
        ch.slide_volume(0xF0);
        ch.slide_volume(0xF0);
        ch.slide_volume(0xF0);
        ch.slide_volume(0xF0);
        assert_eq!(ch.volume, 64);
    }

    #[test]
    fn tone_porta_stops_at_target() {
        let mut ch = Channel::new();
        ch.base_period = 4608;
        ch.target_period = 4500;
        ch.tone_porta(64);
        assert_eq!(ch.base_period, 4544);
        ch.tone_porta(64);
        assert_eq!(ch.base_period, 4500);
        ch.target_period = 4600;
        ch.tone_porta(1000);
        assert_eq!(ch.base_period, 4600);
    }

    #[test]
    fn key_off_without_envelope_silences() {
        let inst = Instrument::new("i");
        let mut ch = playing(40);
        ch.key_off(Some(&inst));
        assert!(!ch.key_on);
        assert_eq!(ch.volume, 0);

        let mut enveloped = inst.clone();
        enveloped.volume_envelope.add_point(0, 64);
        enveloped.volume_envelope.enabled = true;
        let mut ch = playing(40);
        ch.key_off(Some(&enveloped));
        assert_eq!(ch.volume, 40);
    }

    #[test]
    fn fadeout_runs_after_key_off() {
        let mut inst = Instrument::new("i");
        inst.fadeout = 4096;
        let mut ch = playing(64);
        ch.advance_instrument(&inst);
        assert_eq!(ch.fadeout, FADEOUT_FULL);
        ch.key_on = false;
        ch.advance_instrument(&inst);
        assert_eq!(ch.fadeout, FADEOUT_FULL - 4096);
        assert_eq!(ch.final_volume(64), 224);
        for _ in 0..10 {
            ch.advance_instrument(&inst);
        }
        assert_eq!(ch.fadeout, 0);
        assert_eq!(ch.final_volume(64), 0);
    }

    #[test]
    fn panning_envelope_scales_toward_edges() {
        let mut ch = Channel::new();
        let mut env = Envelope::new();
        env.add_point(0, 64);
        env.enabled = true;
        ch.panning_envelope.reset(&env);
        ch.panning = 128;
        assert_eq!(ch.final_panning(), 255);
        ch.panning = 192;
        assert_eq!(ch.final_panning(), 255);
        env.points[0].value = 0;
        ch.panning_envelope.reset(&env);
        ch.panning = 192;
        assert_eq!(ch.final_panning(), 128);
        ch.panning_envelope = EnvelopeCursor::new(PAN_NEUTRAL);
        assert_eq!(ch.final_panning(), 192);
    }

    #[test]
    fn multi_retrig_volume_table() {
        let cases = [(1, 31), (3, 28), (5, 16), (6, 22), (7, 16), (9, 33), (0x0D, 48), (0x0E, 48), (0x0F, 64), (0, 32), (8, 32)];
        for (x, expected) in cases {
            let mut ch = playing(32);
            ch.multi_retrig_volume(x);
            assert_eq!(ch.volume, expected, "x = {x:X}");
        }
    }

    #[test]
    fn tremor_cycles() {
        let mut ch = playing(50);
        let mut pattern = [0u8; 7];
        for slot in pattern.iter_mut() {
            ch.out_volume = ch.volume;
            ch.apply_tremor(0x21);
            *slot = ch.out_volume;
        }
        assert_eq!(pattern, [50, 50, 50, 0, 0, 50, 50]);
    }

    #[test]
    fn tremolo_clamps_output_only() {
        let mut ch = playing(60);
        ch.tremolo.pos = 64;
        ch.apply_tremolo(0x0F);
        assert_eq!(ch.out_volume, 64);
        assert_eq!(ch.volume, 60);
    }

    #[test]
    fn auto_vibrato_sweeps_in() {
        let tables = FrequencyTables::new();
        let vib = AutoVibrato { waveform: 1, sweep: 4, depth: 8, rate: 1 };
        let mut state = AutoVibratoState::default();
        state.reset(&vib);
        assert_eq!(state.amp, 0);
        assert_eq!(state.step, 512);
        for _ in 0..4 {
            state.step(&vib, true, &tables);
        }
        assert_eq!(state.amp, 8 << 8);
        state.step(&vib, true, &tables);
        assert_eq!(state.step, 0);
        assert_eq!(state.amp, 8 << 8);
    }

    #[test]
    fn auto_vibrato_square_delta() {
        let tables = FrequencyTables::new();
        let vib = AutoVibrato { waveform: 1, sweep: 0, depth: 16, rate: 200 };
        let mut state = AutoVibratoState::default();
        state.reset(&vib);
        // pos 200 > 127: +64 << 2 = 256, times amp 4096 >> 16 = 16
        assert_eq!(state.step(&vib, true, &tables), 16);
    }

    #[test]
    fn slide_period_clamps() {
        let mut ch = Channel::new();
        ch.base_period = 10;
        ch.slide_period(-100);
        assert_eq!(ch.base_period, 1);
        ch.slide_period(40_000);
        assert_eq!(ch.base_period, 31999);
    }
}
