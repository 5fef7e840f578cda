//! Vibrato and tremolo oscillators.

use crate::frequency::VIB_TAB;

/// Oscillator shape selected by E4x / E7x.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Waveform {
    #[default]
    Sine,
    Ramp,
    /// Control values 2 and 3 both select square
    Square,
}

impl Waveform {
    /// Decode the low two bits of a waveform control nibble.
    pub fn from_control(control: u8) -> Self {
        match control & 0x03 {
            0 => Waveform::Sine,
            1 => Waveform::Ramp,
            _ => Waveform::Square,
        }
    }

    /// Signed oscillator output at an 8-bit phase, scaled by
    /// `depth / divisor`. The second half of the cycle is negative.
    pub fn sample(self, pos: u8, depth: u8, divisor: u16) -> i16 {
        let index = (pos / 4) & 0x1F;
        let magnitude: u16 = match self {
            Waveform::Sine => VIB_TAB[index as usize] as u16,
            Waveform::Ramp => {
                let ramp = index * 8;
                (if pos >= 128 { ramp ^ 0xFF } else { ramp }) as u16
            }
            Waveform::Square => 255,
        };
        let scaled = (magnitude * depth as u16 / divisor) as i16;
        if pos >= 128 {
            -scaled
        } else {
            scaled
        }
    }
}

/// Oscillator state of one vibrato or tremolo.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Oscillator {
    pub pos: u8,
    pub waveform: Waveform,
    /// Keep the phase when a new note starts
    pub keep_phase: bool,
}

impl Oscillator {
    pub const fn new() -> Self {
        Self { pos: 0, waveform: Waveform::Sine, keep_phase: false }
    }

    /// Apply an E4x / E7x control nibble.
    pub fn set_control(&mut self, control: u8) {
        self.waveform = Waveform::from_control(control);
        self.keep_phase = control & 0x04 != 0;
    }

    /// Reset the phase on note trigger unless the waveform asks to keep it.
    pub fn retrigger(&mut self) {
        if !self.keep_phase {
            self.pos = 0;
        }
    }

    /// Current output, then advance the phase by `speed`.
    pub fn step(&mut self, speed: u8, depth: u8, divisor: u16) -> i16 {
        let value = self.waveform.sample(self.pos, depth, divisor);
        self.pos = self.pos.wrapping_add(speed);
        value
    }
}
