//! FastTracker 2 XM module parser.
//!
//! Headers are read with binrw; packed pattern data and delta-coded sample
//! data are decoded by hand. Patterns are converted to cell grids and then
//! compressed for the engine.

use std::io::{Cursor, Seek, SeekFrom};
use std::sync::Arc;

use binrw::{BinRead, BinReaderExt};
use tm_ir::{
    AutoVibrato, Cell, CompressedPattern, Envelope, EnvelopePoint, FrequencyMode, Instrument, LoopRange, LoopType,
    PatternCompressor, PatternGrid, Sample, SampleData, Song, MAX_ENVELOPE_POINTS, MAX_ROWS,
};

use crate::{read_name, FormatError};

const XM_MAGIC: &[u8; 17] = b"Extended Module: ";
const XM_VERSION: u16 = 0x0104;
const MAX_XM_CHANNELS: u16 = 32;
const MAX_INSTRUMENTS: u16 = 128;
const MAX_SAMPLES_PER_INSTRUMENT: u16 = 16;
/// Offset of the header size field; the header size counts from here.
const HEADER_SIZE_OFFSET: u64 = 60;
const SAMPLE_HEADER_LEN: u32 = 40;

#[derive(BinRead)]
#[br(little, magic = b"Extended Module: ")]
struct XmHeader {
    name: [u8; 20],
    _marker: u8,
    _tracker: [u8; 20],
    version: u16,
    header_size: u32,
    song_length: u16,
    restart_position: u16,
    channels: u16,
    patterns: u16,
    instruments: u16,
    flags: u16,
    speed: u16,
    tempo: u16,
    order: [u8; 256],
}

#[derive(BinRead)]
#[br(little)]
struct XmPatternHeader {
    header_length: u32,
    _packing: u8,
    rows: u16,
    packed_size: u16,
}

#[derive(BinRead)]
#[br(little)]
struct XmInstrumentHeader {
    size: u32,
    name: [u8; 22],
    _kind: u8,
    samples: u16,
}

#[derive(BinRead, Clone, Copy)]
#[br(little)]
struct XmEnvelopePoint {
    tick: u16,
    value: u16,
}

/// Present only when the instrument has samples.
#[derive(BinRead)]
#[br(little)]
struct XmInstrumentExtra {
    sample_header_size: u32,
    sample_map: [u8; 96],
    volume_points: [XmEnvelopePoint; 12],
    panning_points: [XmEnvelopePoint; 12],
    volume_count: u8,
    panning_count: u8,
    volume_sustain: u8,
    volume_loop_start: u8,
    volume_loop_end: u8,
    panning_sustain: u8,
    panning_loop_start: u8,
    panning_loop_end: u8,
    volume_type: u8,
    panning_type: u8,
    vibrato_type: u8,
    vibrato_sweep: u8,
    vibrato_depth: u8,
    vibrato_rate: u8,
    fadeout: u16,
}

#[derive(BinRead)]
#[br(little)]
struct XmSampleHeader {
    length: u32,
    loop_start: u32,
    loop_length: u32,
    volume: u8,
    finetune: i8,
    kind: u8,
    panning: u8,
    relative_note: i8,
    _reserved: u8,
    name: [u8; 22],
}

impl XmSampleHeader {
    fn is_16bit(&self) -> bool {
        self.kind & 0x10 != 0
    }

    fn loop_type(&self) -> LoopType {
        match self.kind & 0x03 {
            0 => LoopType::None,
            1 => LoopType::Forward,
            _ => LoopType::PingPong,
        }
    }
}

/// Load an XM module from bytes.
pub fn load_xm(data: &[u8]) -> Result<Song, FormatError> {
    if data.len() >= XM_MAGIC.len() && !data.starts_with(XM_MAGIC) {
        return Err(FormatError::InvalidHeader);
    }
    let mut cursor = Cursor::new(data);
    let header: XmHeader = cursor.read_le()?;
    if header.version != XM_VERSION {
        return Err(FormatError::UnsupportedVersion(header.version));
    }
    if header.channels == 0 || header.channels > MAX_XM_CHANNELS {
        return Err(FormatError::ChannelCount(header.channels));
    }
    if header.instruments > MAX_INSTRUMENTS {
        return Err(FormatError::InvalidInstrument(header.instruments));
    }
    let channels = header.channels as u8;
    cursor.seek(SeekFrom::Start(HEADER_SIZE_OFFSET + header.header_size as u64))?;

    let mut patterns = Vec::with_capacity(header.patterns as usize);
    for index in 0..header.patterns {
        let grid = read_pattern(&mut cursor, channels, index)?;
        patterns.push(PatternCompressor::compress(&grid));
    }

    let order_len = (header.song_length as usize).min(header.order.len());
    let order = header.order[..order_len].to_vec();
    // Orders may name patterns the file never stores; they play as empty.
    if let Some(&highest) = order.iter().max() {
        while patterns.len() <= highest as usize {
            patterns.push(CompressedPattern::empty(64));
        }
    }

    let mut instruments = Vec::with_capacity(header.instruments as usize);
    for index in 0..header.instruments {
        instruments.push(read_instrument(&mut cursor, data, index)?);
    }

    let name = read_name(&header.name);
    let mut song = Song::with_patterns(&name, channels, patterns);
    song.restart_position = if (header.restart_position as usize) < order.len() {
        header.restart_position as u8
    } else {
        0
    };
    song.order = order;
    song.initial_speed = header.speed.min(255) as u8;
    song.initial_tempo = header.tempo.min(255) as u8;
    song.frequency_mode = if header.flags & 1 != 0 { FrequencyMode::Linear } else { FrequencyMode::Amiga };
    song.instruments = instruments;
    song.validate()?;

    tracing::debug!(
        name = song.name.as_str(),
        channels = song.channel_count,
        patterns = song.pattern_count(),
        instruments = song.instrument_count(),
        "parsed XM module"
    );
    Ok(song)
}

fn read_pattern(cursor: &mut Cursor<&[u8]>, channels: u8, index: u16) -> Result<PatternGrid, FormatError> {
    let start = cursor.position();
    let header: XmPatternHeader = cursor.read_le()?;
    if header.rows == 0 || header.rows > MAX_ROWS {
        return Err(FormatError::InvalidPattern(index));
    }
    cursor.seek(SeekFrom::Start(start + header.header_length as u64))?;

    let mut grid = PatternGrid::new(header.rows, channels);
    if header.packed_size == 0 {
        return Ok(grid);
    }
    let data_start = cursor.position() as usize;
    let packed = cursor
        .get_ref()
        .get(data_start..data_start + header.packed_size as usize)
        .ok_or(FormatError::UnexpectedEof)?;
    unpack_cells(packed, &mut grid).ok_or(FormatError::InvalidPattern(index))?;
    cursor.seek(SeekFrom::Current(header.packed_size as i64))?;
    Ok(grid)
}

/// Decode XM pattern packing into `grid`. A leading byte with the high bit
/// set is a mask of the fields that follow; otherwise five raw bytes
/// follow in order. Returns `None` if the data ends mid-cell.
fn unpack_cells(packed: &[u8], grid: &mut PatternGrid) -> Option<()> {
    let mut bytes = packed.iter().copied();
    for cell in grid.data.iter_mut() {
        let Some(first) = bytes.next() else {
            break;
        };
        *cell = if first & 0x80 != 0 {
            let mut field = |bit: u8| -> Option<u8> {
                if first & bit != 0 {
                    bytes.next()
                } else {
                    Some(0)
                }
            };
            Cell {
                note: field(0x01)?,
                instrument: field(0x02)?,
                volume: field(0x04)?,
                command: field(0x08)?,
                parameter: field(0x10)?,
            }
        } else {
            Cell {
                note: first,
                instrument: bytes.next()?,
                volume: bytes.next()?,
                command: bytes.next()?,
                parameter: bytes.next()?,
            }
        };
    }
    Some(())
}

fn read_instrument(cursor: &mut Cursor<&[u8]>, data: &[u8], index: u16) -> Result<Instrument, FormatError> {
    let start = cursor.position();
    let header: XmInstrumentHeader = cursor.read_le()?;
    let mut instrument = Instrument::new(&read_name(&header.name));
    if header.samples == 0 {
        cursor.seek(SeekFrom::Start(start + header.size as u64))?;
        return Ok(instrument);
    }
    if header.samples > MAX_SAMPLES_PER_INSTRUMENT {
        return Err(FormatError::InvalidInstrument(index));
    }

    let extra: XmInstrumentExtra = cursor.read_le()?;
    instrument.sample_map = extra.sample_map;
    instrument.volume_envelope = envelope(
        &extra.volume_points,
        extra.volume_count,
        extra.volume_type,
        extra.volume_sustain,
        (extra.volume_loop_start, extra.volume_loop_end),
    );
    instrument.panning_envelope = envelope(
        &extra.panning_points,
        extra.panning_count,
        extra.panning_type,
        extra.panning_sustain,
        (extra.panning_loop_start, extra.panning_loop_end),
    );
    instrument.fadeout = extra.fadeout;
    instrument.vibrato = AutoVibrato {
        waveform: extra.vibrato_type & 0x03,
        sweep: extra.vibrato_sweep,
        depth: extra.vibrato_depth,
        rate: extra.vibrato_rate,
    };
    cursor.seek(SeekFrom::Start(start + header.size as u64))?;

    let mut headers = Vec::with_capacity(header.samples as usize);
    for _ in 0..header.samples {
        let sample_start = cursor.position();
        headers.push(XmSampleHeader::read_le(cursor)?);
        cursor.seek(SeekFrom::Start(sample_start + extra.sample_header_size.max(SAMPLE_HEADER_LEN) as u64))?;
    }
    for h in &headers {
        let offset = cursor.position() as usize;
        let end = offset.saturating_add(h.length as usize);
        let bytes = match data.get(offset..end) {
            Some(bytes) => bytes,
            None => {
                tracing::warn!(instrument = index, "sample data truncated");
                data.get(offset..).unwrap_or_default()
            }
        };
        instrument.samples.push(sample(h, bytes));
        cursor.seek(SeekFrom::Current(bytes.len() as i64))?;
    }
    Ok(instrument)
}

fn envelope(
    points: &[XmEnvelopePoint; 12],
    count: u8,
    kind: u8,
    sustain: u8,
    (loop_start, loop_end): (u8, u8),
) -> Envelope {
    let count = (count as usize).min(MAX_ENVELOPE_POINTS);
    let mut env = Envelope::new();
    for p in &points[..count] {
        env.points.push(EnvelopePoint { tick: p.tick, value: p.value.min(64) as u8 });
    }
    env.enabled = kind & 0x01 != 0 && count > 0;
    env.sustain = (kind & 0x02 != 0 && (sustain as usize) < count).then_some(sustain);
    env.loop_range = (kind & 0x04 != 0 && loop_start <= loop_end && (loop_end as usize) < count)
        .then_some(LoopRange { start: loop_start, end: loop_end });
    env
}

/// Build a sample from its header and delta-coded data. Lengths and loop
/// points in the header are in bytes.
fn sample(h: &XmSampleHeader, bytes: &[u8]) -> Sample {
    let mut sample = Sample::new(&read_name(&h.name));
    let (data, width) = if h.is_16bit() {
        let mut acc = 0i16;
        let frames: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| {
                acc = acc.wrapping_add(i16::from_le_bytes([pair[0], pair[1]]));
                acc
            })
            .collect();
        (SampleData::Pcm16(Arc::from(frames)), 2)
    } else {
        let mut acc = 0i8;
        let frames: Vec<i8> = bytes
            .iter()
            .map(|&b| {
                acc = acc.wrapping_add(b as i8);
                acc
            })
            .collect();
        (SampleData::Pcm8(Arc::from(frames)), 1)
    };
    let len = data.len() as u32;
    sample.data = data;
    sample.volume = h.volume.min(64);
    sample.panning = h.panning;
    sample.finetune = h.finetune;
    sample.relative_note = h.relative_note;

    let start = h.loop_start / width;
    let end = start.saturating_add(h.loop_length / width).min(len);
    if h.loop_type() != LoopType::None && start < end {
        sample.loop_type = h.loop_type();
        sample.loop_start = start;
        sample.loop_end = end;
    }
    sample
}
