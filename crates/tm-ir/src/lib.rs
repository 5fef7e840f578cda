//! Core data model for the tickmix tracker engine.
//!
//! Loaders produce a [`Song`]; the engine consumes it. Patterns are kept in
//! compressed form and decoded on demand with a [`PatternDecoder`].
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod compressor;
mod effects;
mod instrument;
mod pattern;
pub mod pattern_codec;
mod sample;
mod song;

pub use compressor::PatternCompressor;
pub use effects::{Effect, EffectFamily, VolumeCommand};
pub use instrument::{interpolate, AutoVibrato, Envelope, EnvelopePoint, Instrument, LoopRange, MAX_ENVELOPE_POINTS};
pub use pattern::{Cell, CompressedPattern, Note, NoteKey, PatternGrid, EMPTY, MAX_COMMAND, MAX_NOTE, MAX_ROWS, NOTE_OFF};
pub use pattern_codec::{Opcode, PatternDecoder};
pub use sample::{LoopType, Sample, SampleData, SampleKey, SampleLoop};
pub use song::{FrequencyMode, Song, SongError, MAX_ORDERS};
