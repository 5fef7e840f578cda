//! Playback engine for the tickmix tracker.
//!
//! A [`TickSequencer`] turns pattern data into per-channel state once per
//! tick, a [`SoftwareMixer`] renders that state into 32-bit accumulators,
//! and a [`StreamAdapter`] interleaves the two for a pull-based audio
//! callback. [`AudioEngineContext`] owns all three.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod channel;
mod config;
mod context;
mod effect_memory;
mod envelope_state;
mod frame;
pub mod frequency;
mod mixer;
mod sequencer;
mod stream;
mod voice;
mod waveform;

pub use channel::{AutoVibratoState, Channel};
pub use config::{EngineConfig, Interpolation, BLOCK_SIZE, MAX_CHANNELS, UNITY_VOLUME};
pub use context::AudioEngineContext;
pub use effect_memory::EffectMemory;
pub use envelope_state::EnvelopeCursor;
pub use frame::{narrow, Frame};
pub use frequency::FrequencyTables;
pub use mixer::SoftwareMixer;
pub use sequencer::{PlayState, Position, TickSequencer};
pub use stream::StreamAdapter;
pub use voice::{Source, Voice};
pub use waveform::{Oscillator, Waveform};
