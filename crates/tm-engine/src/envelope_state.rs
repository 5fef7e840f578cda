//! Runtime cursor over an instrument [`Envelope`].

use tm_ir::{interpolate, Envelope};

/// Value of a disabled volume envelope.
pub const VOLUME_NEUTRAL: u8 = 64;

/// Value of a disabled panning envelope.
pub const PAN_NEUTRAL: u8 = 32;

/// Playback state of one envelope on one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvelopeCursor {
    /// Absolute envelope time in ticks
    tick: u16,
    /// Index of the node at or before `tick`
    point: u8,
    /// Current output value
    value: u8,
    /// Final node reached without a loop
    done: bool,
    /// Reset but not yet advanced: the first advance evaluates tick 0
    fresh: bool,
    neutral: u8,
}

impl EnvelopeCursor {
    /// A cursor that outputs `neutral` until reset against an envelope.
    pub const fn new(neutral: u8) -> Self {
        Self { tick: 0, point: 0, value: neutral, done: false, fresh: true, neutral }
    }

    /// Rewind to the start of the envelope.
    pub fn reset(&mut self, envelope: &Envelope) {
        self.tick = 0;
        self.point = 0;
        self.done = false;
        self.fresh = true;
        self.value = match envelope.points.first() {
            Some(first) if envelope.enabled => first.value,
            _ => self.neutral,
        };
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn tick(&self) -> u16 {
        self.tick
    }

    pub fn point(&self) -> u8 {
        self.point
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Advance by one tick. While `key_on` is held the cursor stops on the
    /// sustain node; reaching the loop end node jumps to the loop start.
    pub fn advance(&mut self, envelope: &Envelope, key_on: bool) {
        if !envelope.is_active() {
            self.value = self.neutral;
            return;
        }
        let points = &envelope.points;
        if self.fresh {
            self.fresh = false;
            self.settle(envelope);
            return;
        }
        if self.done {
            return;
        }

        let at_node = |cursor: &Self, node: u8| {
            cursor.point == node && points.get(node as usize).is_some_and(|p| cursor.tick >= p.tick)
        };

        if key_on {
            if let Some(sustain) = envelope.sustain {
                if at_node(self, sustain) {
                    return;
                }
            }
        }

        self.tick = self.tick.saturating_add(1);
        self.settle(envelope);

        // The loop end wraps on the tick that reaches it, unless it is also
        // a held sustain node.
        if let Some(range) = valid_loop(envelope) {
            let held = key_on && envelope.sustain == Some(range.end);
            if !held && at_node(self, range.end) {
                let start = points[range.start as usize];
                self.point = range.start;
                self.tick = start.tick;
                self.value = start.value;
            }
        }
    }

    /// Jump to an absolute envelope tick (effect Lxx).
    pub fn set_position(&mut self, envelope: &Envelope, tick: u16) {
        self.fresh = false;
        self.done = false;
        self.tick = tick;
        self.point = 0;
        if !envelope.is_active() {
            self.value = self.neutral;
            return;
        }
        self.settle(envelope);
    }

    /// Move `point` forward past every node whose time is reached and
    /// recompute `value` at `tick`.
    fn settle(&mut self, envelope: &Envelope) {
        let points = &envelope.points;
        let last = points.len() - 1;
        let mut point = (self.point as usize).min(last);
        while point < last && self.tick >= points[point + 1].tick {
            point += 1;
        }
        self.point = point as u8;
        if point == last {
            self.value = points[last].value;
            self.tick = self.tick.max(points[last].tick);
            self.done = valid_loop(envelope).is_none()
                && !(envelope.sustain == Some(last as u8));
        } else {
            self.value = interpolate(points[point], points[point + 1], self.tick);
        }
    }
}

/// Loop range if both node indices exist and are ordered.
fn valid_loop(envelope: &Envelope) -> Option<tm_ir::LoopRange> {
    envelope
        .loop_range
        .filter(|r| r.start <= r.end && (r.end as usize) < envelope.points.len())
}
