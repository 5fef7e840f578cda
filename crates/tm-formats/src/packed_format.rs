//! The engine's packed song format.
//!
//! Layout: the magic `TMPK`, one endianness byte (`L` or `B`), then a
//! binrw struct stream in that byte order. Compressed pattern streams are
//! stored verbatim, so loading needs no recompression.

use std::io::{Cursor, Write};
use std::sync::Arc;

use binrw::{binrw, BinReaderExt, BinWriterExt, Endian};
use tm_ir::{
    AutoVibrato, CompressedPattern, Envelope, EnvelopePoint, FrequencyMode, Instrument, LoopRange, LoopType, Sample,
    SampleData, Song, MAX_ENVELOPE_POINTS,
};

use crate::{read_name, write_name, FormatError};

pub const PACKED_MAGIC: &[u8; 4] = b"TMPK";
pub const PACKED_VERSION: u16 = 1;

const ENV_ENABLED: u8 = 0x01;
const ENV_SUSTAIN: u8 = 0x02;
const ENV_LOOP: u8 = 0x04;

#[binrw]
struct PackedSong {
    version: u16,
    name: [u8; 20],
    restart_position: u8,
    initial_speed: u8,
    initial_tempo: u8,
    linear: u8,
    channel_count: u8,
    global_volume: u8,
    #[br(temp)]
    #[bw(calc = order.len() as u16)]
    order_len: u16,
    #[br(count = order_len as usize)]
    order: Vec<u8>,
    #[br(temp)]
    #[bw(calc = patterns.len() as u16)]
    pattern_count: u16,
    #[br(count = pattern_count as usize)]
    patterns: Vec<PackedPattern>,
    #[br(temp)]
    #[bw(calc = instruments.len() as u16)]
    instrument_count: u16,
    #[br(count = instrument_count as usize)]
    instruments: Vec<PackedInstrument>,
}

#[binrw]
struct PackedPattern {
    rows: u16,
    #[br(temp)]
    #[bw(calc = data.len() as u32)]
    len: u32,
    #[br(count = len as usize)]
    data: Vec<u8>,
}

#[binrw]
struct PackedInstrument {
    name: [u8; 22],
    sample_map: [u8; 96],
    volume_envelope: PackedEnvelope,
    panning_envelope: PackedEnvelope,
    fadeout: u16,
    vibrato: [u8; 4],
    #[br(temp)]
    #[bw(calc = samples.len() as u8)]
    sample_count: u8,
    #[br(count = sample_count as usize)]
    samples: Vec<PackedSample>,
}

#[binrw]
struct PackedEnvelope {
    flags: u8,
    sustain: u8,
    loop_start: u8,
    loop_end: u8,
    #[br(temp)]
    #[bw(calc = points.len() as u8)]
    count: u8,
    #[br(count = count as usize)]
    points: Vec<PackedPoint>,
}

#[binrw]
struct PackedPoint {
    tick: u16,
    value: u8,
}

#[binrw]
struct PackedSample {
    name: [u8; 22],
    loop_start: u32,
    loop_end: u32,
    loop_type: u8,
    volume: u8,
    panning: u8,
    finetune: i8,
    relative_note: i8,
    /// 8 or 16
    bits: u8,
    frames: u32,
    #[br(if(bits == 8), count = frames as usize)]
    pcm8: Vec<i8>,
    #[br(if(bits == 16), count = frames as usize)]
    pcm16: Vec<i16>,
}

/// Serialize a song in the packed format with the given byte order.
pub fn write_packed(song: &Song, endian: Endian) -> Result<Vec<u8>, FormatError> {
    let packed = PackedSong {
        version: PACKED_VERSION,
        name: write_name(song.name.as_str()),
        restart_position: song.restart_position,
        initial_speed: song.initial_speed,
        initial_tempo: song.initial_tempo,
        linear: u8::from(song.frequency_mode == FrequencyMode::Linear),
        channel_count: song.channel_count,
        global_volume: song.global_volume,
        order: song.order.clone(),
        patterns: song
            .patterns
            .iter()
            .map(|p| PackedPattern { rows: p.rows, data: p.data.clone() })
            .collect(),
        instruments: song.instruments.iter().map(pack_instrument).collect(),
    };
    let mut out = Cursor::new(Vec::new());
    out.write_all(PACKED_MAGIC)?;
    out.write_all(&[match endian {
        Endian::Little => b'L',
        Endian::Big => b'B',
    }])?;
    out.write_type(&packed, endian)?;
    Ok(out.into_inner())
}

/// Load a packed song. The byte order is taken from the file.
pub fn load_packed(data: &[u8]) -> Result<Song, FormatError> {
    if data.len() < PACKED_MAGIC.len() + 1 {
        return Err(FormatError::UnexpectedEof);
    }
    if &data[..4] != PACKED_MAGIC {
        return Err(FormatError::InvalidHeader);
    }
    let endian = match data[4] {
        b'L' => Endian::Little,
        b'B' => Endian::Big,
        other => return Err(FormatError::EndianMarker(other)),
    };
    let mut cursor = Cursor::new(&data[5..]);
    let version: u16 = cursor.read_type(endian)?;
    if version != PACKED_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }
    cursor.set_position(0);
    let packed: PackedSong = cursor.read_type(endian)?;

    let patterns = packed
        .patterns
        .into_iter()
        .map(|p| CompressedPattern { rows: p.rows, data: p.data })
        .collect();
    let mut song = Song::with_patterns(&read_name(&packed.name), packed.channel_count, patterns);
    song.restart_position = packed.restart_position;
    song.order = packed.order;
    song.initial_speed = packed.initial_speed;
    song.initial_tempo = packed.initial_tempo;
    song.frequency_mode = if packed.linear != 0 { FrequencyMode::Linear } else { FrequencyMode::Amiga };
    song.global_volume = packed.global_volume.min(64);
    song.instruments = packed
        .instruments
        .into_iter()
        .enumerate()
        .map(|(i, inst)| unpack_instrument(inst).ok_or(FormatError::InvalidInstrument(i as u16)))
        .collect::<Result<_, _>>()?;
    song.validate()?;

    tracing::debug!(name = song.name.as_str(), ?endian, "loaded packed song");
    Ok(song)
}

fn pack_instrument(inst: &Instrument) -> PackedInstrument {
    let v = inst.vibrato;
    PackedInstrument {
        name: write_name(inst.name.as_str()),
        sample_map: inst.sample_map,
        volume_envelope: pack_envelope(&inst.volume_envelope),
        panning_envelope: pack_envelope(&inst.panning_envelope),
        fadeout: inst.fadeout,
        vibrato: [v.waveform, v.sweep, v.depth, v.rate],
        samples: inst.samples.iter().map(pack_sample).collect(),
    }
}

fn unpack_instrument(p: PackedInstrument) -> Option<Instrument> {
    let mut inst = Instrument::new(&read_name(&p.name));
    inst.sample_map = p.sample_map;
    inst.volume_envelope = unpack_envelope(p.volume_envelope)?;
    inst.panning_envelope = unpack_envelope(p.panning_envelope)?;
    inst.fadeout = p.fadeout;
    let [waveform, sweep, depth, rate] = p.vibrato;
    inst.vibrato = AutoVibrato { waveform, sweep, depth, rate };
    inst.samples = p.samples.into_iter().map(unpack_sample).collect::<Option<_>>()?;
    Some(inst)
}

fn pack_envelope(env: &Envelope) -> PackedEnvelope {
    let mut flags = 0;
    if env.enabled {
        flags |= ENV_ENABLED;
    }
    if env.sustain.is_some() {
        flags |= ENV_SUSTAIN;
    }
    if env.loop_range.is_some() {
        flags |= ENV_LOOP;
    }
    let range = env.loop_range.unwrap_or(LoopRange { start: 0, end: 0 });
    PackedEnvelope {
        flags,
        sustain: env.sustain.unwrap_or(0),
        loop_start: range.start,
        loop_end: range.end,
        points: env.points.iter().map(|p| PackedPoint { tick: p.tick, value: p.value }).collect(),
    }
}

fn unpack_envelope(p: PackedEnvelope) -> Option<Envelope> {
    if p.points.len() > MAX_ENVELOPE_POINTS {
        return None;
    }
    let mut env = Envelope::new();
    for point in &p.points {
        env.points.push(EnvelopePoint { tick: point.tick, value: point.value });
    }
    env.enabled = p.flags & ENV_ENABLED != 0;
    env.sustain = (p.flags & ENV_SUSTAIN != 0).then_some(p.sustain);
    env.loop_range = (p.flags & ENV_LOOP != 0).then_some(LoopRange { start: p.loop_start, end: p.loop_end });
    Some(env)
}

fn pack_sample(s: &Sample) -> PackedSample {
    let (bits, pcm8, pcm16) = match &s.data {
        SampleData::Pcm8(d) => (8, d.to_vec(), Vec::new()),
        SampleData::Pcm16(d) => (16, Vec::new(), d.to_vec()),
    };
    PackedSample {
        name: write_name(s.name.as_str()),
        loop_start: s.loop_start,
        loop_end: s.loop_end,
        loop_type: match s.loop_type {
            LoopType::None => 0,
            LoopType::Forward => 1,
            LoopType::PingPong => 2,
        },
        volume: s.volume,
        panning: s.panning,
        finetune: s.finetune,
        relative_note: s.relative_note,
        bits,
        frames: s.len() as u32,
        pcm8,
        pcm16,
    }
}

fn unpack_sample(p: PackedSample) -> Option<Sample> {
    let mut s = Sample::new(&read_name(&p.name));
    s.data = match p.bits {
        8 => SampleData::Pcm8(Arc::from(p.pcm8)),
        16 => SampleData::Pcm16(Arc::from(p.pcm16)),
        _ => return None,
    };
    s.loop_type = match p.loop_type {
        0 => LoopType::None,
        1 => LoopType::Forward,
        2 => LoopType::PingPong,
        _ => return None,
    };
    s.loop_start = p.loop_start;
    s.loop_end = p.loop_end;
    s.volume = p.volume.min(64);
    s.panning = p.panning;
    s.finetune = p.finetune;
    s.relative_note = p.relative_note;
    Some(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_ir::{Cell, PatternCompressor, PatternGrid};

    fn song() -> Song {
        let mut grid = PatternGrid::new(8, 2);
        *grid.cell_mut(0, 0) = Cell::note(49, 1);
        *grid.cell_mut(3, 1) = Cell { command: 0x0F, parameter: 0x03, ..Cell::note(61, 1) };
        let mut song = Song::with_patterns("packed", 2, vec![PatternCompressor::compress(&grid)]);
        song.order = vec![0, 0];
        song.restart_position = 1;
        song.initial_tempo = 140;
        song.frequency_mode = FrequencyMode::Amiga;
        song.global_volume = 48;

        let mut inst = Instrument::new("lead");
        inst.volume_envelope.add_point(0, 64);
        inst.volume_envelope.add_point(20, 0);
        inst.volume_envelope.enabled = true;
        inst.volume_envelope.sustain = Some(0);
        inst.fadeout = 512;
        inst.vibrato = AutoVibrato { waveform: 1, sweep: 2, depth: 3, rate: 4 };
        let mut sample = Sample::new("wave");
        sample.data = SampleData::Pcm16(Arc::from(vec![-300i16, 1, 0x1234, 7]));
        sample.loop_type = LoopType::PingPong;
        sample.loop_start = 1;
        sample.loop_end = 3;
        sample.finetune = -5;
        sample.relative_note = -12;
        inst.samples.push(sample);
        let mut drum = Sample::new("drum");
        drum.data = SampleData::Pcm8(Arc::from(vec![1i8, -2, 3]));
        inst.samples.push(drum);
        inst.sample_map[60] = 1;
        song.instruments.push(inst);
        song
    }

    fn assert_same(a: &Song, b: &Song) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.order, b.order);
        assert_eq!(a.restart_position, b.restart_position);
        assert_eq!(a.initial_tempo, b.initial_tempo);
        assert_eq!(a.frequency_mode, b.frequency_mode);
        assert_eq!(a.global_volume, b.global_volume);
        assert_eq!(&a.patterns[..], &b.patterns[..]);
        let (x, y) = (&a.instruments[0], &b.instruments[0]);
        assert_eq!(x.sample_map, y.sample_map);
        assert_eq!(x.volume_envelope, y.volume_envelope);
        assert_eq!(x.fadeout, y.fadeout);
        assert_eq!(x.vibrato, y.vibrato);
        assert_eq!(x.samples.len(), y.samples.len());
        for (s, t) in x.samples.iter().zip(&y.samples) {
            assert_eq!((s.loop_type, s.loop_start, s.loop_end), (t.loop_type, t.loop_start, t.loop_end));
            assert_eq!((s.finetune, s.relative_note), (t.finetune, t.relative_note));
            assert_eq!(s.len(), t.len());
            assert!((0..s.len()).all(|i| s.data.get_mono(i) == t.data.get_mono(i)));
        }
    }

    #[test]
    fn both_byte_orders_load() {
        let original = song();
        for endian in [Endian::Little, Endian::Big] {
            let bytes = write_packed(&original, endian).unwrap();
            let loaded = load_packed(&bytes).unwrap();
            assert_same(&original, &loaded);
        }
    }

    #[test]
    fn byte_order_is_visible_in_the_stream() {
        let le = write_packed(&song(), Endian::Little).unwrap();
        let be = write_packed(&song(), Endian::Big).unwrap();
        assert_eq!(&le[..5], b"TMPKL");
        assert_eq!(&be[..5], b"TMPKB");
        assert_eq!(&le[5..7], &[1, 0]);
        assert_eq!(&be[5..7], &[0, 1]);
    }

    #[test]
    fn bad_headers_are_rejected() {
        assert_eq!(load_packed(b"TMP").unwrap_err(), FormatError::UnexpectedEof);
        assert_eq!(load_packed(b"XXXXL\x01\x00").unwrap_err(), FormatError::InvalidHeader);
        assert_eq!(load_packed(b"TMPKX\x01\x00").unwrap_err(), FormatError::EndianMarker(b'X'));
        assert_eq!(load_packed(b"TMPKL\x09\x00").unwrap_err(), FormatError::UnsupportedVersion(9));
    }

    #[test]
    fn truncated_stream_is_eof() {
        let bytes = write_packed(&song(), Endian::Little).unwrap();
        assert_eq!(load_packed(&bytes[..bytes.len() - 3]).unwrap_err(), FormatError::UnexpectedEof);
    }

    #[test]
    fn invalid_song_fails_validation() {
        let mut bad = song();
        bad.order = vec![3];
        let bytes = write_packed(&bad, Endian::Big).unwrap();
        assert!(matches!(load_packed(&bytes), Err(FormatError::Song(_))));
    }
}
