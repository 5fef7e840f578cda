//! WAV encoding for 16-bit stereo PCM.

use std::io::{Cursor, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tm_engine::Frame;

fn spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Encode frames into any seekable writer.
pub fn write_wav<W: Write + Seek>(w: W, frames: &[Frame], sample_rate: u32) -> Result<(), hound::Error> {
    let mut writer = WavWriter::new(w, spec(sample_rate))?;
    for frame in frames {
        writer.write_sample(frame.left)?;
        writer.write_sample(frame.right)?;
    }
    writer.finalize()
}

/// Encode frames into an in-memory WAV file.
pub fn frames_to_wav(frames: &[Frame], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let mut buf = Cursor::new(Vec::new());
    write_wav(&mut buf, frames, sample_rate)?;
    Ok(buf.into_inner())
}

/// Encode frames into a file at `path`.
pub fn write_wav_file(path: &Path, frames: &[Frame], sample_rate: u32) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, spec(sample_rate))?;
    for frame in frames {
        writer.write_sample(frame.left)?;
        writer.write_sample(frame.right)?;
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_and_samples() {
        let frames = [Frame { left: 1, right: -1 }, Frame { left: 0x1234, right: 0 }];
        let wav = frames_to_wav(&frames, 22050).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 8);
        assert_eq!(&wav[44..], &[1, 0, 0xFF, 0xFF, 0x34, 0x12, 0, 0]);
    }

    #[test]
    fn reads_back_with_hound() {
        let frames: Vec<Frame> = (0..100).map(|i| Frame { left: i, right: -i }).collect();
        let wav = frames_to_wav(&frames, 44100).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 44100);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 200);
        assert_eq!(samples[198..], [99, -99]);
    }
}
