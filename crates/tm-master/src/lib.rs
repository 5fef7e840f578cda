//! Headless controller for the tickmix tracker.
//!
//! Provides one API for loading songs, real-time playback and offline
//! rendering that the CLI and tests share.

mod wav;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tm_audio::{AudioError, AudioOutput, CpalOutput};
use tm_engine::AudioEngineContext;

// Re-export common types so callers don't need tm-ir/tm-engine directly.
pub use tm_engine::{EngineConfig, Frame, Interpolation, Position};
pub use tm_formats::{Endian, FormatError};
pub use tm_ir::{Song, SongError};

pub use wav::{frames_to_wav, write_wav, write_wav_file};

/// Ring buffer length for real-time playback.
const OUTPUT_LATENCY_MS: u32 = 100;

/// Errors surfaced by the controller.
#[derive(Debug, thiserror::Error)]
pub enum MasterError {
    #[error("no song loaded")]
    NoSong,
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Song(#[from] SongError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error("wav export failed: {0}")]
    Wav(#[from] hound::Error),
}

/// Headless tracker controller: owns a song and manages playback.
pub struct Controller {
    song: Option<Song>,
    config: EngineConfig,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    stop_signal: Arc<AtomicBool>,
    position: Arc<PositionSnapshot>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Playback position published by the audio thread as one atomic word.
#[derive(Default)]
struct PositionSnapshot(AtomicU64);

impl PositionSnapshot {
    fn store(&self, p: Position) {
        let packed = (p.order as u64 & 0xFFFF) << 32 | (p.pattern as u64) << 24 | (p.row as u64) << 8 | p.tick as u64;
        self.0.store(packed, Ordering::Relaxed);
    }

    fn load(&self) -> Position {
        let v = self.0.load(Ordering::Relaxed);
        Position {
            order: (v >> 32 & 0xFFFF) as usize,
            pattern: (v >> 24 & 0xFF) as u8,
            row: (v >> 8 & 0xFFFF) as u16,
            tick: (v & 0xFF) as u8,
        }
    }
}

impl Controller {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            song: None,
            config,
            playback: None,
        }
    }

    // --- Song management ---

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn load_xm(&mut self, data: &[u8]) -> Result<(), FormatError> {
        let song = tm_formats::load_xm(data)?;
        self.set_song(song);
        Ok(())
    }

    pub fn load_packed(&mut self, data: &[u8]) -> Result<(), FormatError> {
        let song = tm_formats::load_packed(data)?;
        self.set_song(song);
        Ok(())
    }

    /// Pick the loader from the file's magic bytes.
    pub fn load_file(&mut self, path: &Path) -> Result<(), MasterError> {
        let data = std::fs::read(path).map_err(|e| FormatError::Malformed(format!("{}: {e}", path.display())))?;
        if data.starts_with(tm_formats::PACKED_MAGIC) {
            self.load_packed(&data)?;
        } else {
            self.load_xm(&data)?;
        }
        Ok(())
    }

    /// Take an already built song. It is validated here.
    pub fn set_song_checked(&mut self, song: Song) -> Result<(), SongError> {
        song.validate()?;
        self.set_song(song);
        Ok(())
    }

    fn set_song(&mut self, song: Song) {
        self.stop();
        tracing::info!(name = song.name.as_str(), orders = song.order.len(), "controller song set");
        self.song = Some(song);
    }

    /// Serialize the current song in the packed format.
    pub fn export_packed(&self, endian: Endian) -> Result<Vec<u8>, MasterError> {
        let song = self.song.as_ref().ok_or(MasterError::NoSong)?;
        Ok(tm_formats::write_packed(song, endian)?)
    }

    // --- Real-time playback ---

    /// Start playback on a dedicated thread that feeds the default output device.
    pub fn play(&mut self, looping: bool) -> Result<(), MasterError> {
        self.stop();
        let song = self.song.clone().ok_or(MasterError::NoSong)?;
        let config = self.config;
        let stop_signal = Arc::new(AtomicBool::new(false));
        let position = Arc::new(PositionSnapshot::default());
        let finished = Arc::new(AtomicBool::new(false));

        let stop = stop_signal.clone();
        let pos = position.clone();
        let done = finished.clone();

        let thread = std::thread::Builder::new()
            .name("tm-audio".into())
            .spawn(move || {
                if let Err(e) = audio_thread(song, config, looping, &stop, &pos) {
                    tracing::error!(error = %e, "playback failed");
                }
                done.store(true, Ordering::Relaxed);
            })
            .map_err(|e| AudioError::Playback(e.to_string()))?;

        self.playback = Some(PlaybackHandle {
            stop_signal,
            position,
            finished,
            thread: Some(thread),
        });
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.thread.take() {
                let _ = handle.join();
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    pub fn is_finished(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| p.finished.load(Ordering::Relaxed))
    }

    pub fn position(&self) -> Option<Position> {
        let pb = self.playback.as_ref()?;
        if pb.finished.load(Ordering::Relaxed) {
            return None;
        }
        Some(pb.position.load())
    }

    // --- Offline rendering ---

    /// Render the song once from the first order, up to `max_frames`.
    pub fn render_frames(&self, max_frames: usize) -> Result<Vec<Frame>, MasterError> {
        let song = self.song.clone().ok_or(MasterError::NoSong)?;
        let mut ctx = AudioEngineContext::new(self.config);
        ctx.load_song(song)?;
        ctx.play(false, 0);

        let block = ctx.config().block_frames;
        let mut frames = vec![Frame::silence(); max_frames];
        let mut done = 0;
        while done < max_frames && !ctx.is_finished() {
            let end = (done + block).min(max_frames);
            done += ctx.fill_frames(&mut frames[done..end]);
        }
        frames.truncate(done);
        tracing::debug!(frames = done, finished = ctx.is_finished(), "offline render");
        Ok(frames)
    }

    pub fn render_to_wav(&self, max_seconds: u32) -> Result<Vec<u8>, MasterError> {
        let sample_rate = self.config.sample_rate;
        let frames = self.render_frames(sample_rate as usize * max_seconds as usize)?;
        Ok(wav::frames_to_wav(&frames, sample_rate)?)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn audio_thread(
    song: Song,
    config: EngineConfig,
    looping: bool,
    stop_signal: &AtomicBool,
    position: &PositionSnapshot,
) -> Result<(), MasterError> {
    let (mut output, consumer) = CpalOutput::new(OUTPUT_LATENCY_MS)?;
    let mut ctx = AudioEngineContext::new(EngineConfig {
        sample_rate: output.sample_rate(),
        output_channels: 2,
        ..config
    });
    ctx.load_song(song)?;
    ctx.play(looping, 0);

    output.build_stream(consumer)?;
    output.start()?;

    let mut block = vec![Frame::silence(); ctx.config().block_frames];
    while ctx.is_playing() && !stop_signal.load(Ordering::Relaxed) {
        let n = ctx.fill_frames(&mut block);
        output.write_spin(&block[..n]);
        position.store(ctx.position());
    }

    if !stop_signal.load(Ordering::Relaxed) {
        while !output.is_drained() && !stop_signal.load(Ordering::Relaxed) {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }
    ctx.unload_song();
    output.stop()?;
    Ok(())
}
