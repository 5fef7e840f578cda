//! Period tables and period-to-frequency conversion.
//!
//! Periods are FastTracker 2 periods: linear periods step 64 units per
//! semitone (C-4 = 4608), Amiga periods are the ProTracker table scaled
//! by 4 (C-4 = 1712). Both map C-4 at finetune 0 to 8363 Hz.

use tm_ir::FrequencyMode;

/// Playback rate of C-4 at finetune 0, in Hz.
pub const C4_RATE: u32 = 8363;

/// Amiga period of C-4.
pub const AMIGA_C4_PERIOD: u32 = 1712;

/// Lowest period accepted by slides (highest pitch).
pub const PERIOD_MIN: u16 = 1;

/// Highest period accepted by slides (lowest pitch).
pub const PERIOD_MAX: u16 = 31999;

/// Highest zero-based semitone a note can be transposed to.
pub const MAX_SEMITONE: i16 = 118;

/// Linear period units per octave.
const LINEAR_OCTAVE: u32 = 768;

/// Linear period at which the log table is indexed from zero.
const LINEAR_ORIGIN: u32 = 9216;

/// Amiga periods for one octave, 8 finetune steps per semitone.
/// Index 8 is C at finetune 0.
pub const AMIGA_FINE_PERIOD: [u16; 96] = [
    907, 900, 894, 887, 881, 875, 868, 862, 856, 850, 844, 838,
    832, 826, 820, 814, 808, 802, 796, 791, 785, 779, 774, 768,
    762, 757, 752, 746, 741, 736, 730, 725, 720, 715, 709, 704,
    699, 694, 689, 684, 678, 675, 670, 665, 660, 655, 651, 646,
    640, 636, 632, 628, 623, 619, 614, 610, 604, 601, 597, 592,
    588, 584, 580, 575, 570, 567, 563, 559, 555, 551, 547, 543,
    538, 535, 532, 528, 524, 520, 516, 513, 508, 505, 502, 498,
    494, 491, 487, 484, 480, 477, 474, 470, 467, 463, 460, 457,
];

/// Half-period sine used by vibrato and tremolo.
pub const VIB_TAB: [u8; 32] = [
    0, 24, 49, 74, 97, 120, 141, 161,
    180, 197, 212, 224, 235, 244, 250, 253,
    255, 253, 250, 244, 235, 224, 212, 197,
    180, 161, 141, 120, 97, 74, 49, 24,
];

/// Multipliers for 0-11 semitones, scaled by 65536.
/// `SEMITONE_MUL[n] = round(2^(n/12) * 65536)`
const SEMITONE_MUL: [u32; 12] = [
    65536, 69433, 73562, 77936, 82570, 87480, 92682, 98193, 104032, 110218, 116772, 123715,
];

/// Lookup tables built once per sequencer.
#[derive(Clone, Debug)]
pub struct FrequencyTables {
    /// `log_tab[i] = round(8363 * 256 * 2^(i / 768))`
    log_tab: [u32; LINEAR_OCTAVE as usize],
    /// Full-period sine for instrument auto-vibrato, -64..64, phase inverted.
    auto_vibrato_sine: [i8; 256],
}

impl Default for FrequencyTables {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyTables {
    pub fn new() -> Self {
        let mut log_tab = [0u32; LINEAR_OCTAVE as usize];
        for (i, entry) in log_tab.iter_mut().enumerate() {
            let ratio = libm::exp2(i as f64 / LINEAR_OCTAVE as f64);
            *entry = (256.0 * C4_RATE as f64 * ratio + 0.5) as u32;
        }
        let mut auto_vibrato_sine = [0i8; 256];
        for (i, entry) in auto_vibrato_sine.iter_mut().enumerate() {
            let phase = -(i as f64) * 2.0 * core::f64::consts::PI / 256.0;
            *entry = libm::floor(64.0 * libm::sin(phase) + 0.5) as i8;
        }
        Self { log_tab, auto_vibrato_sine }
    }

    /// Playback rate in Hz for a period. Period 0 is silent.
    pub fn period_to_hz(&self, mode: FrequencyMode, period: u16) -> u32 {
        if period == 0 {
            return 0;
        }
        match mode {
            FrequencyMode::Linear => {
                let index = LINEAR_ORIGIN.saturating_sub(period as u32);
                let rate = self.log_tab[(index % LINEAR_OCTAVE) as usize];
                let octave = index / LINEAR_OCTAVE;
                if octave <= 14 {
                    rate >> (14 - octave)
                } else {
                    rate << (octave - 14)
                }
            }
            FrequencyMode::Amiga => AMIGA_C4_PERIOD * C4_RATE / period as u32,
        }
    }

    /// Auto-vibrato sine at an 8-bit phase.
    pub fn auto_vibrato_sine(&self, pos: u8) -> i8 {
        self.auto_vibrato_sine[pos as usize]
    }
}

/// Period of a zero-based semitone (C-0 = 0, C-4 = 48) at a finetune
/// in 1/128 semitone steps. Out-of-range semitones are clamped.
pub fn note_period(mode: FrequencyMode, semitone: i16, finetune: i8) -> u16 {
    let semitone = semitone.clamp(0, MAX_SEMITONE) as i32;
    let index = semitone * 16 + (finetune as i32 >> 3) + 16;
    match mode {
        FrequencyMode::Linear => (7744 - index * 4) as u16,
        FrequencyMode::Amiga => {
            let half = (index / 2) as u32;
            if index % 2 == 0 {
                amiga_entry(half)
            } else {
                ((amiga_entry(half) as u32 + amiga_entry(half + 1) as u32) / 2) as u16
            }
        }
    }
}

fn amiga_entry(j: u32) -> u16 {
    let octave = j / 96;
    let base = AMIGA_FINE_PERIOD[(j % 96) as usize] as u32 * 64;
    ((base + (1 << octave) - 1) >> (octave + 1)) as u16
}

/// Period raised by `semitones`, keeping any slide already applied.
pub fn arpeggio_period(mode: FrequencyMode, period: u16, semitones: u8) -> u16 {
    if semitones == 0 || period == 0 {
        return period;
    }
    match mode {
        FrequencyMode::Linear => clamp_period(period as i32 - semitones as i32 * 64),
        FrequencyMode::Amiga => {
            let octaves = semitones as u32 / 12;
            let scaled = ((period as u64) << 16) / SEMITONE_MUL[(semitones % 12) as usize] as u64;
            clamp_period((scaled >> octaves) as i32)
        }
    }
}

/// Clamp a period to the range accepted by slides.
pub fn clamp_period(period: i32) -> u16 {
    period.clamp(PERIOD_MIN as i32, PERIOD_MAX as i32) as u16
}
