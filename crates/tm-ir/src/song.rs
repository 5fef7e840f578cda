//! Song structure.

use alloc::sync::Arc;
use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::instrument::Instrument;
use crate::pattern::{CompressedPattern, MAX_ROWS};
use crate::pattern_codec::MAX_CODEC_CHANNELS;

/// Maximum length of the order list.
pub const MAX_ORDERS: usize = 256;

/// Pitch model used for period computation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrequencyMode {
    /// Linear periods, 64 units per semitone
    #[default]
    Linear,
    /// Amiga period table
    Amiga,
}

/// Load-time validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SongError {
    #[error("order list is empty")]
    EmptyOrderList,
    #[error("order list has {0} entries (max {MAX_ORDERS})")]
    TooManyOrders(usize),
    #[error("order {order} references pattern {pattern}, but only {count} patterns exist")]
    PatternOutOfRange { order: usize, pattern: u8, count: usize },
    #[error("restart position {restart} is past the end of the order list ({len})")]
    RestartOutOfRange { restart: u8, len: usize },
    #[error("channel count {0} is outside 1..=32")]
    ChannelCount(u8),
    #[error("pattern {pattern} has {rows} rows (expected 1..=256)")]
    PatternRows { pattern: usize, rows: u16 },
    #[error("initial speed must be nonzero")]
    ZeroSpeed,
    #[error("initial tempo {0} is below 32")]
    TempoTooLow(u8),
    #[error("instrument {instrument} sample {sample} loop {start}..{end} exceeds {len} frames")]
    SampleLoop { instrument: usize, sample: usize, start: u32, end: u32, len: usize },
}

/// A complete song. Immutable once validated.
#[derive(Clone, Debug)]
pub struct Song {
    /// Song title
    pub name: ArrayString<20>,
    /// Order index to continue from when a looping song ends
    pub restart_position: u8,
    /// Play order: pattern indices
    pub order: Vec<u8>,
    /// Initial speed (ticks per row)
    pub initial_speed: u8,
    /// Initial tempo in BPM
    pub initial_tempo: u8,
    /// Linear or Amiga periods
    pub frequency_mode: FrequencyMode,
    /// Number of tracker channels (1-32)
    pub channel_count: u8,
    /// Global volume (0-64)
    pub global_volume: u8,
    /// Compressed pattern bank, shareable between songs
    pub patterns: Arc<[CompressedPattern]>,
    /// Instruments
    pub instruments: Vec<Instrument>,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            restart_position: 0,
            order: Vec::new(),
            initial_speed: 6,
            initial_tempo: 125,
            frequency_mode: FrequencyMode::Linear,
            channel_count: 1,
            global_volume: 64,
            patterns: Arc::from([]),
            instruments: Vec::new(),
        }
    }
}

impl Song {
    /// Create a new empty song.
    pub fn new(name: &str) -> Self {
        let mut song = Self::default();
        let _ = song.name.try_push_str(name);
        song
    }

    /// Create a song with a channel count and a pattern bank.
    pub fn with_patterns(name: &str, channel_count: u8, patterns: Vec<CompressedPattern>) -> Self {
        Self {
            channel_count,
            patterns: Arc::from(patterns),
            ..Self::new(name)
        }
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn instrument_count(&self) -> usize {
        self.instruments.len()
    }

    /// Pattern played at an order position.
    pub fn pattern_at(&self, order: usize) -> Option<&CompressedPattern> {
        let index = *self.order.get(order)?;
        self.patterns.get(index as usize)
    }

    /// Use another song's pattern bank. The bank is reference counted, so
    /// the source song may be dropped first.
    pub fn share_pattern_data(&mut self, source: &Song) {
        self.patterns = Arc::clone(&source.patterns);
    }

    /// True if both songs play from the same pattern bank.
    pub fn shares_patterns_with(&self, other: &Song) -> bool {
        Arc::ptr_eq(&self.patterns, &other.patterns)
    }

    /// Check the invariants the sequencer relies on.
    pub fn validate(&self) -> Result<(), SongError> {
        if self.order.is_empty() {
            return Err(SongError::EmptyOrderList);
        }
        if self.order.len() > MAX_ORDERS {
            return Err(SongError::TooManyOrders(self.order.len()));
        }
        for (order, &pattern) in self.order.iter().enumerate() {
            if pattern as usize >= self.patterns.len() {
                return Err(SongError::PatternOutOfRange { order, pattern, count: self.patterns.len() });
            }
        }
        if self.restart_position as usize >= self.order.len() {
            return Err(SongError::RestartOutOfRange {
                restart: self.restart_position,
                len: self.order.len(),
            });
        }
        if self.channel_count == 0 || self.channel_count as usize > MAX_CODEC_CHANNELS {
            return Err(SongError::ChannelCount(self.channel_count));
        }
        for (pattern, p) in self.patterns.iter().enumerate() {
            if p.rows == 0 || p.rows > MAX_ROWS {
                return Err(SongError::PatternRows { pattern, rows: p.rows });
            }
        }
        if self.initial_speed == 0 {
            return Err(SongError::ZeroSpeed);
        }
        if self.initial_tempo < 32 {
            return Err(SongError::TempoTooLow(self.initial_tempo));
        }
        for (instrument, inst) in self.instruments.iter().enumerate() {
            for (sample, s) in inst.samples.iter().enumerate() {
                let looped = s.loop_type != crate::sample::LoopType::None;
                if looped && (s.loop_start > s.loop_end || s.loop_end as usize > s.len()) {
                    return Err(SongError::SampleLoop {
                        instrument,
                        sample,
                        start: s.loop_start,
                        end: s.loop_end,
                        len: s.len(),
                    });
                }
            }
        }
        Ok(())
    }
}
