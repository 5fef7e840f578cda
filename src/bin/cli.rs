//! tickmix CLI: headless playback, WAV export and packed conversion.
//!
//! Usage:
//!   tm-cli play song.xm [--loop]
//!   tm-cli render song.xm -o out.wav
//!   tm-cli pack song.xm -o song.tmpk

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tm_master::{Controller, EngineConfig, Endian, Interpolation, Song};

#[derive(Parser)]
#[command(name = "tm-cli")]
#[command(about = "Play, render and convert XM tracker modules")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a module on the default output device
    Play {
        /// XM or packed song file
        file: PathBuf,

        /// Wrap to the restart position instead of stopping at the end
        #[arg(long = "loop")]
        looping: bool,

        /// Resampling mode
        #[arg(long, value_enum, default_value_t = Resample::Linear)]
        interpolation: Resample,
    },

    /// Render a module to a 16-bit stereo WAV file
    Render {
        /// XM or packed song file
        file: PathBuf,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Stop after this many seconds even if the song has not ended
        #[arg(long, default_value_t = 300)]
        seconds: u32,

        /// Output sample rate in Hz
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,

        /// Resampling mode
        #[arg(long, value_enum, default_value_t = Resample::Linear)]
        interpolation: Resample,
    },

    /// Convert a module to the packed format
    Pack {
        /// XM or packed song file
        file: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Write big-endian fields
        #[arg(long)]
        big_endian: bool,
    },

    /// Print song information
    Info {
        /// XM or packed song file
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Resample {
    Nearest,
    Linear,
}

impl From<Resample> for Interpolation {
    fn from(r: Resample) -> Self {
        match r {
            Resample::Nearest => Interpolation::Nearest,
            Resample::Linear => Interpolation::Linear,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            file,
            looping,
            interpolation,
        } => {
            let config = EngineConfig {
                interpolation: interpolation.into(),
                ..EngineConfig::default()
            };
            let mut ctrl = open(&file, config)?;
            print_info(&ctrl);
            play(&mut ctrl, looping)
        }
        Commands::Render {
            file,
            output,
            seconds,
            sample_rate,
            interpolation,
        } => {
            let config = EngineConfig {
                sample_rate,
                interpolation: interpolation.into(),
                ..EngineConfig::default()
            };
            let ctrl = open(&file, config)?;
            println!("Rendering to {} at {} Hz...", output.display(), sample_rate);
            let wav = ctrl.render_to_wav(seconds)?;
            std::fs::write(&output, &wav).with_context(|| format!("failed to write {}", output.display()))?;
            println!("Wrote {} bytes", wav.len());
            Ok(())
        }
        Commands::Pack {
            file,
            output,
            big_endian,
        } => {
            let ctrl = open(&file, EngineConfig::default())?;
            let endian = if big_endian { Endian::Big } else { Endian::Little };
            let bytes = ctrl.export_packed(endian)?;
            std::fs::write(&output, &bytes).with_context(|| format!("failed to write {}", output.display()))?;
            println!("Packed {} into {} bytes", file.display(), bytes.len());
            Ok(())
        }
        Commands::Info { file } => {
            let ctrl = open(&file, EngineConfig::default())?;
            print_info(&ctrl);
            Ok(())
        }
    }
}

fn open(path: &Path, config: EngineConfig) -> Result<Controller> {
    let mut ctrl = Controller::new(config);
    ctrl.load_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(ctrl)
}

fn print_info(ctrl: &Controller) {
    let Some(song) = ctrl.song() else {
        return;
    };
    println!("Title:       {}", song.name.as_str());
    println!("Channels:    {}", song.channel_count);
    println!("Patterns:    {}", song.pattern_count());
    println!("Orders:      {}", song.order.len());
    println!("Tempo:       {} BPM, Speed: {}", song.initial_tempo, song.initial_speed);
    println!("Instruments: {} ({} samples)", song.instrument_count(), sample_count(song));
    println!();
}

fn sample_count(song: &Song) -> usize {
    song.instruments
        .iter()
        .flat_map(|i| i.samples.iter())
        .filter(|s| !s.is_empty())
        .count()
}

fn play(ctrl: &mut Controller, looping: bool) -> Result<()> {
    ctrl.play(looping)?;
    println!("Playing... (Ctrl-C to quit)");

    while ctrl.is_playing() {
        if let Some(pos) = ctrl.position() {
            print!("\rOrd: {:02X} | Pat: {:02X} | Row: {:02X}", pos.order, pos.pattern, pos.row);
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    println!("\rDone.                          ");
    Ok(())
}
