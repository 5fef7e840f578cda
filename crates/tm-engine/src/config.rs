//! Engine configuration.

/// Default number of frames rendered per mixer pass.
pub const BLOCK_SIZE: usize = 512;

/// Maximum tracker channels, and so the minimum useful mixer slot count.
pub const MAX_CHANNELS: usize = 32;

/// Unity master volume.
pub const UNITY_VOLUME: u16 = 256;

/// Sample resampling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    /// Nearest-neighbour (truncating) lookup
    Nearest,
    /// Linear interpolation between adjacent frames
    #[default]
    Linear,
}

/// Construction-time parameters of an [`AudioEngineContext`](crate::AudioEngineContext).
///
/// All buffers are sized from this when the context is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved output channel count (1 = mono, 2 = stereo, more are zero-filled)
    pub output_channels: u16,
    /// Mixer playback slots. Tracker channel n drives slot n, so a context
    /// always allocates at least [`MAX_CHANNELS`].
    pub mixer_slots: usize,
    /// Frames rendered per mixer pass
    pub block_frames: usize,
    /// Resampling mode
    pub interpolation: Interpolation,
    /// Master volume applied when narrowing (256 = unity)
    pub master_volume: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            output_channels: 2,
            mixer_slots: MAX_CHANNELS,
            block_frames: BLOCK_SIZE,
            interpolation: Interpolation::Linear,
            master_volume: UNITY_VOLUME,
        }
    }
}

impl EngineConfig {
    /// Default configuration at a given sample rate.
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self { sample_rate, ..Self::default() }
    }

    /// Config with zero sizes replaced by defaults.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            sample_rate: if self.sample_rate == 0 { defaults.sample_rate } else { self.sample_rate },
            output_channels: self.output_channels.max(1),
            mixer_slots: self.mixer_slots.max(1),
            block_frames: if self.block_frames == 0 { BLOCK_SIZE } else { self.block_frames },
            ..self
        }
    }
}
