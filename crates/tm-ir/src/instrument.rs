//! Instrument and envelope types.

use alloc::vec::Vec;
use arrayvec::{ArrayString, ArrayVec};

use crate::pattern::MAX_NOTE;
use crate::sample::Sample;

/// Maximum nodes per envelope.
pub const MAX_ENVELOPE_POINTS: usize = 12;

/// An instrument definition.
#[derive(Clone, Debug)]
pub struct Instrument {
    /// Instrument name
    pub name: ArrayString<22>,
    /// Sample mapping: note (0-95) -> index into `samples`
    pub sample_map: [u8; MAX_NOTE as usize],
    /// Samples owned by this instrument
    pub samples: Vec<Sample>,
    /// Volume envelope (values 0-64)
    pub volume_envelope: Envelope,
    /// Panning envelope (values 0-64, centre 32)
    pub panning_envelope: Envelope,
    /// Fadeout speed applied after key-off (0 = no fade)
    pub fadeout: u16,
    /// Instrument auto-vibrato
    pub vibrato: AutoVibrato,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            sample_map: [0; MAX_NOTE as usize],
            samples: Vec::new(),
            volume_envelope: Envelope::default(),
            panning_envelope: Envelope::default(),
            fadeout: 0,
            vibrato: AutoVibrato::default(),
        }
    }
}

impl Instrument {
    /// Create a new instrument with default settings.
    pub fn new(name: &str) -> Self {
        let mut inst = Self::default();
        let _ = inst.name.try_push_str(name);
        inst
    }

    /// Set all notes to map to a single sample.
    pub fn set_single_sample(&mut self, sample_index: u8) {
        self.sample_map.fill(sample_index);
    }

    /// Sample index played for a note (1-96), if the mapping is valid.
    pub fn sample_for_note(&self, note: u8) -> Option<usize> {
        let slot = self.sample_map.get(note.checked_sub(1)? as usize)?;
        let index = *slot as usize;
        (index < self.samples.len()).then_some(index)
    }
}

/// A volume or panning envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Envelope nodes, ordered by tick
    pub points: ArrayVec<EnvelopePoint, MAX_ENVELOPE_POINTS>,
    /// Sustain node index (None = no sustain)
    pub sustain: Option<u8>,
    /// Loop node range (None = no loop)
    pub loop_range: Option<LoopRange>,
    /// Is the envelope enabled?
    pub enabled: bool,
}

impl Envelope {
    /// Create a new empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the envelope. Nodes past the capacity are dropped.
    pub fn add_point(&mut self, tick: u16, value: u8) {
        let _ = self.points.try_push(EnvelopePoint { tick, value });
    }

    /// True if the envelope is enabled and has nodes to play.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.points.is_empty()
    }

    /// Interpolated value at an absolute tick. Holds the first value before
    /// the first node and the last value after the final node.
    pub fn value_at(&self, tick: u16) -> u8 {
        let Some(first) = self.points.first() else {
            return 0;
        };
        if tick <= first.tick {
            return first.value;
        }
        for pair in self.points.windows(2) {
            if tick <= pair[1].tick {
                return interpolate(pair[0], pair[1], tick);
            }
        }
        self.points.last().map_or(0, |p| p.value)
    }
}

/// Linear interpolation between two envelope nodes at `tick`.
///
/// Exactly `a.value` at `a.tick` and `b.value` at `b.tick`.
pub fn interpolate(a: EnvelopePoint, b: EnvelopePoint, tick: u16) -> u8 {
    if b.tick <= a.tick || tick <= a.tick {
        return a.value;
    }
    if tick >= b.tick {
        return b.value;
    }
    let t = (tick - a.tick) as i32;
    let d = (b.tick - a.tick) as i32;
    let v = a.value as i32 + (b.value as i32 - a.value as i32) * t / d;
    v as u8
}

/// A node in an envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnvelopePoint {
    /// Tick position
    pub tick: u16,
    /// Value (0-64)
    pub value: u8,
}

/// Loop range within an envelope, as node indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopRange {
    /// Node index to loop back to.
    pub start: u8,
    /// Node index that triggers the loop.
    pub end: u8,
}

/// Instrument auto-vibrato settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AutoVibrato {
    /// Waveform type (0=sine, 1=square, 2=ramp up, 3=ramp down)
    pub waveform: u8,
    /// Ticks until full depth
    pub sweep: u8,
    /// Vibrato depth
    pub depth: u8,
    /// Vibrato rate
    pub rate: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_interpolation() {
        let mut env = Envelope::new();
        env.add_point(0, 64);
        env.add_point(100, 0);

        assert_eq!(env.value_at(0), 64);
        assert_eq!(env.value_at(50), 32);
        assert_eq!(env.value_at(100), 0);
        assert_eq!(env.value_at(200), 0);
    }

    #[test]
    fn interpolation_is_exact_at_nodes() {
        let a = EnvelopePoint { tick: 4, value: 10 };
        let b = EnvelopePoint { tick: 12, value: 50 };
        assert_eq!(interpolate(a, b, 4), 10);
        assert_eq!(interpolate(a, b, 12), 50);
        assert_eq!(interpolate(a, b, 8), 30);
        for t in 4..=12 {
            let expected = 10 + (50 - 10) * (t as i32 - 4) / 8;
            assert_eq!(interpolate(a, b, t) as i32, expected);
        }
    }

    #[test]
    fn interpolation_descending() {
        let a = EnvelopePoint { tick: 0, value: 64 };
        let b = EnvelopePoint { tick: 3, value: 0 };
        assert_eq!(interpolate(a, b, 1), 43);
        assert_eq!(interpolate(a, b, 2), 22);
    }

    #[test]
    fn envelope_capacity_is_bounded() {
        let mut env = Envelope::new();
        for i in 0..20 {
            env.add_point(i * 2, 32);
        }
        assert_eq!(env.points.len(), MAX_ENVELOPE_POINTS);
    }

    #[test]
    fn sample_for_note_checks_bounds() {
        let mut inst = Instrument::new("lead");
        inst.samples.push(Sample::new("s"));
        inst.sample_map[48] = 0;
        inst.sample_map[49] = 3;
        assert_eq!(inst.sample_for_note(49), Some(0));
        assert_eq!(inst.sample_for_note(50), None);
        assert_eq!(inst.sample_for_note(0), None);
        assert_eq!(inst.sample_for_note(200), None);
    }
}
