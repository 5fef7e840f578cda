//! Engine context: owns the mixer, sequencer and stream adapter of one
//! playback instance.

use tm_ir::{Song, SongError};

use crate::config::{EngineConfig, MAX_CHANNELS};
use crate::frame::Frame;
use crate::mixer::SoftwareMixer;
use crate::sequencer::{PlayState, Position, TickSequencer};
use crate::stream::StreamAdapter;

/// A complete playback engine. Build one per output stream; there is no
/// shared global state.
///
/// ```ignore
/// let mut ctx = AudioEngineContext::new(EngineConfig::default());
/// ctx.load_song(song)?;
/// ctx.play(true, 0);
/// ctx.fill_buffer_interleaved(&mut out);
/// ```
pub struct AudioEngineContext {
    config: EngineConfig,
    mixer: SoftwareMixer,
    sequencer: TickSequencer,
    stream: StreamAdapter,
}

impl AudioEngineContext {
    pub fn new(config: EngineConfig) -> Self {
        let config = config.sanitized();
        Self {
            mixer: SoftwareMixer::new(config.mixer_slots.max(MAX_CHANNELS), config.sample_rate, config.interpolation),
            sequencer: TickSequencer::new(),
            stream: StreamAdapter::new(config.sample_rate, config.block_frames, config.master_volume),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate a song and make it current. The previous song, if any, is
    /// unloaded first. Every non-empty sample is registered with the mixer.
    pub fn load_song(&mut self, mut song: Song) -> Result<(), SongError> {
        song.validate()?;
        self.unload_song();
        let mut registered = 0usize;
        for sample in song.instruments.iter_mut().flat_map(|i| i.samples.iter_mut()) {
            sample.mixer_id = if sample.is_empty() {
                None
            } else {
                registered += 1;
                Some(self.mixer.register_sample(sample.data.clone()))
            };
        }
        tracing::info!(
            name = song.name.as_str(),
            channels = song.channel_count,
            orders = song.order.len(),
            samples = registered,
            "song loaded"
        );
        self.sequencer.load(song);
        Ok(())
    }

    /// Stop playback, release the song's samples and hand the song back.
    pub fn unload_song(&mut self) -> Option<Song> {
        self.stop();
        let mut song = self.sequencer.unload()?;
        for sample in song.instruments.iter_mut().flat_map(|i| i.samples.iter_mut()) {
            if let Some(key) = sample.mixer_id.take() {
                self.mixer.unregister_sample(key);
            }
        }
        tracing::debug!(name = song.name.as_str(), "song unloaded");
        Some(song)
    }

    pub fn song(&self) -> Option<&Song> {
        self.sequencer.song()
    }

    /// Start from an order index. Returns false if no song is loaded.
    pub fn play(&mut self, looping: bool, start_order: usize) -> bool {
        self.mixer.deactivate_all();
        self.stream.reset();
        let started = self.sequencer.play(looping, start_order);
        if started {
            tracing::info!(looping, start_order, "playback started");
        }
        started
    }

    pub fn stop(&mut self) {
        if self.sequencer.is_playing() {
            tracing::info!("playback stopped");
        }
        self.sequencer.stop(&mut self.mixer);
        self.mixer.deactivate_all();
    }

    /// Render into separate channel buffers.
    pub fn fill_buffer(&mut self, left: &mut [i16], right: &mut [i16]) -> usize {
        let Self { mixer, sequencer, stream, .. } = self;
        realtime(|| stream.fill_buffer(sequencer, mixer, left, right))
    }

    /// Render interleaved samples with the configured output channel count.
    pub fn fill_buffer_interleaved(&mut self, out: &mut [i16]) -> usize {
        let channels = self.config.output_channels;
        let Self { mixer, sequencer, stream, .. } = self;
        realtime(|| stream.fill_buffer_interleaved(sequencer, mixer, out, channels))
    }

    pub fn fill_frames(&mut self, out: &mut [Frame]) -> usize {
        let Self { mixer, sequencer, stream, .. } = self;
        realtime(|| stream.fill_frames(sequencer, mixer, out))
    }

    pub fn state(&self) -> PlayState {
        self.sequencer.state()
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.is_playing()
    }

    /// True once a one-shot song has played its last tick and stopped.
    pub fn is_finished(&self) -> bool {
        self.sequencer.reached_end() && !self.sequencer.is_playing()
    }

    pub fn position(&self) -> Position {
        self.sequencer.position()
    }

    pub fn set_master_volume(&mut self, volume: u16) {
        self.config.master_volume = volume;
        self.stream.set_master_volume(volume);
    }

    pub fn sequencer(&self) -> &TickSequencer {
        &self.sequencer
    }

    pub fn mixer(&self) -> &SoftwareMixer {
        &self.mixer
    }
}

#[cfg(feature = "alloc_check")]
use assert_no_alloc::assert_no_alloc as realtime;

#[cfg(not(feature = "alloc_check"))]
#[inline(always)]
fn realtime<T>(f: impl FnOnce() -> T) -> T {
    f()
}
