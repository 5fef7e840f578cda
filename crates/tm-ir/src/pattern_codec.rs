//! Compressed pattern stream decoder.
//!
//! A pattern is a byte stream of variable-length records. Each record
//! starts with an opcode byte: the top 3 bits select the [`Opcode`], the
//! low 5 bits carry a count, channel or field mask. Field masks name the
//! five note fields (bit 0 note, 1 instrument, 2 volume, 3 command,
//! 4 parameter); every channel keeps a cache of the last value read for
//! each field.

use core::cmp::Ordering;

use crate::pattern::{CompressedPattern, Note, EMPTY};

/// Number of note fields tracked by the field cache.
pub const FIELD_COUNT: usize = 5;

/// Maximum channels addressable by the 5-bit channel payload.
pub const MAX_CODEC_CHANNELS: usize = 32;

/// Maximum rows a single `AdvanceRows` record can skip.
pub const MAX_ROW_ADVANCE: u8 = 32;

pub const FIELD_NOTE: u8 = 1 << 0;
pub const FIELD_INSTRUMENT: u8 = 1 << 1;
pub const FIELD_VOLUME: u8 = 1 << 2;
pub const FIELD_COMMAND: u8 = 1 << 3;
pub const FIELD_PARAMETER: u8 = 1 << 4;

/// Field values of an empty note, in field-bit order.
pub(crate) const EMPTY_FIELDS: [u8; FIELD_COUNT] = [0, EMPTY, EMPTY, EMPTY, 0];

const PAYLOAD_MASK: u8 = 0x1F;

/// A decoded opcode byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    /// Advance 1-32 rows and return to channel 0.
    AdvanceRows(u8),
    /// Advance one row and seek to a channel.
    AdvanceRowsAndChannel(u8),
    /// Seek to a channel within the current row.
    SeekChannel(u8),
    /// Take the masked fields of the next cell from the channel cache.
    UseCachedFields(u8),
    /// Read one byte per masked field; each byte also refreshes the cache.
    ReadNewFields(u8),
    EndOfPattern,
}

impl Opcode {
    /// Decode an opcode byte. Undefined opcodes yield `None`.
    pub fn decode(byte: u8) -> Option<Self> {
        let payload = byte & PAYLOAD_MASK;
        match byte >> 5 {
            0 => Some(Opcode::AdvanceRows(payload + 1)),
            1 => Some(Opcode::AdvanceRowsAndChannel(payload)),
            2 => Some(Opcode::SeekChannel(payload)),
            3 => Some(Opcode::UseCachedFields(payload)),
            4 => Some(Opcode::ReadNewFields(payload)),
            7 => Some(Opcode::EndOfPattern),
            _ => None,
        }
    }

    /// Encode to an opcode byte.
    pub fn encode(self) -> u8 {
        match self {
            Opcode::AdvanceRows(n) => {
                debug_assert!((1..=MAX_ROW_ADVANCE).contains(&n));
                (n - 1) & PAYLOAD_MASK
            }
            Opcode::AdvanceRowsAndChannel(c) => (1 << 5) | (c & PAYLOAD_MASK),
            Opcode::SeekChannel(c) => (2 << 5) | (c & PAYLOAD_MASK),
            Opcode::UseCachedFields(m) => (3 << 5) | (m & PAYLOAD_MASK),
            Opcode::ReadNewFields(m) => (4 << 5) | (m & PAYLOAD_MASK),
            Opcode::EndOfPattern => 7 << 5,
        }
    }
}

/// A decoded cell together with its position.
#[derive(Clone, Copy, Debug)]
struct Located {
    row: u16,
    channel: u8,
    note: Note,
}

/// Random-access decoder over one compressed pattern.
///
/// Requests at or after the previous (row, channel) continue from the
/// current stream position; an earlier request rewinds to the start of
/// the pattern. Call [`reset`](Self::reset) when switching patterns.
#[derive(Clone, Debug)]
pub struct PatternDecoder {
    pos: usize,
    row: u16,
    channel: u8,
    cache: [[u8; FIELD_COUNT]; MAX_CODEC_CHANNELS],
    lookahead: Option<Located>,
    ended: bool,
    last_request: Option<(u16, u8)>,
}

impl Default for PatternDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternDecoder {
    pub const fn new() -> Self {
        Self {
            pos: 0,
            row: 0,
            channel: 0,
            cache: [EMPTY_FIELDS; MAX_CODEC_CHANNELS],
            lookahead: None,
            ended: false,
            last_request: None,
        }
    }

    /// Forget all cursor state, e.g. when moving to another pattern.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Decode the note at (row, channel). Positions without a record
    /// decode as [`Note::EMPTY`].
    pub fn decompress_note(&mut self, pattern: &CompressedPattern, row: u16, channel: u8) -> Note {
        let target = (row, channel);
        if self.last_request.is_some_and(|last| target < last) {
            self.reset();
        }
        self.last_request = Some(target);

        loop {
            if self.lookahead.is_none() {
                if self.ended {
                    return Note::EMPTY;
                }
                self.lookahead = self.next_cell(&pattern.data);
                if self.lookahead.is_none() {
                    self.ended = true;
                    return Note::EMPTY;
                }
            }
            let Some(cell) = self.lookahead else {
                return Note::EMPTY;
            };
            match (cell.row, cell.channel).cmp(&target) {
                Ordering::Equal => return cell.note,
                Ordering::Greater => return Note::EMPTY,
                Ordering::Less => self.lookahead = None,
            }
        }
    }

    /// Execute records until the next cell is produced. Truncated streams
    /// and undefined opcodes end the pattern.
    fn next_cell(&mut self, data: &[u8]) -> Option<Located> {
        loop {
            let op = Opcode::decode(*data.get(self.pos)?)?;
            self.pos += 1;
            match op {
                Opcode::EndOfPattern => return None,
                Opcode::AdvanceRows(n) => {
                    self.row = self.row.saturating_add(n as u16);
                    self.channel = 0;
                }
                Opcode::AdvanceRowsAndChannel(c) => {
                    self.row = self.row.saturating_add(1);
                    self.channel = c;
                }
                Opcode::SeekChannel(c) => self.channel = c,
                Opcode::UseCachedFields(mask) => {
                    let cache = self.cache.get(self.channel as usize)?;
                    let mut fields = EMPTY_FIELDS;
                    for (bit, field) in fields.iter_mut().enumerate() {
                        if mask & (1 << bit) != 0 {
                            *field = cache[bit];
                        }
                    }
                    let follow = data.get(self.pos).copied().and_then(Opcode::decode);
                    if let Some(Opcode::ReadNewFields(new_mask)) = follow {
                        self.pos += 1;
                        self.read_fields(data, new_mask, &mut fields)?;
                    }
                    return Some(self.emit(fields));
                }
                Opcode::ReadNewFields(mask) => {
                    let mut fields = EMPTY_FIELDS;
                    self.read_fields(data, mask, &mut fields)?;
                    return Some(self.emit(fields));
                }
            }
        }
    }

    fn read_fields(&mut self, data: &[u8], mask: u8, fields: &mut [u8; FIELD_COUNT]) -> Option<()> {
        let cache = self.cache.get_mut(self.channel as usize)?;
        for bit in 0..FIELD_COUNT {
            if mask & (1 << bit) != 0 {
                let value = *data.get(self.pos)?;
                self.pos += 1;
                fields[bit] = value;
                cache[bit] = value;
            }
        }
        Some(())
    }

    fn emit(&mut self, fields: [u8; FIELD_COUNT]) -> Located {
        let located = Located {
            row: self.row,
            channel: self.channel,
            note: Note {
                note: fields[0],
                instrument: fields[1],
                volume: fields[2],
                command: fields[3],
                parameter: fields[4],
            },
        };
        self.channel = self.channel.saturating_add(1);
        located
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn pattern(rows: u16, data: alloc::vec::Vec<u8>) -> CompressedPattern {
        CompressedPattern { rows, data }
    }

    #[test]
    fn opcode_bytes_roundtrip() {
        for op in [
            Opcode::AdvanceRows(1),
            Opcode::AdvanceRows(32),
            Opcode::AdvanceRowsAndChannel(5),
            Opcode::SeekChannel(31),
            Opcode::UseCachedFields(0x1F),
            Opcode::ReadNewFields(FIELD_NOTE | FIELD_PARAMETER),
            Opcode::EndOfPattern,
        ] {
            assert_eq!(Opcode::decode(op.encode()), Some(op));
        }
    }

    #[test]
    fn undefined_opcodes_do_not_decode() {
        assert_eq!(Opcode::decode(5 << 5), None);
        assert_eq!(Opcode::decode(6 << 5), None);
    }

    #[test]
    fn read_new_fields_places_cell_at_cursor() {
        let p = pattern(
            4,
            vec![
                Opcode::SeekChannel(2).encode(),
                Opcode::ReadNewFields(FIELD_NOTE | FIELD_INSTRUMENT).encode(),
                49,
                0,
                Opcode::EndOfPattern.encode(),
            ],
        );
        let mut dec = PatternDecoder::new();
        assert!(dec.decompress_note(&p, 0, 0).is_empty());
        let n = dec.decompress_note(&p, 0, 2);
        assert_eq!(n.note, 49);
        assert_eq!(n.instrument, 0);
        assert_eq!(n.volume, EMPTY);
        assert!(dec.decompress_note(&p, 0, 3).is_empty());
        assert!(dec.decompress_note(&p, 3, 0).is_empty());
    }

    #[test]
    fn cached_fields_reuse_previous_values() {
        let p = pattern(
            4,
            vec![
                Opcode::ReadNewFields(FIELD_NOTE | FIELD_VOLUME).encode(),
                61,
                0x20,
                Opcode::AdvanceRows(2).encode(),
                Opcode::UseCachedFields(FIELD_VOLUME).encode(),
                Opcode::ReadNewFields(FIELD_NOTE).encode(),
                63,
                Opcode::EndOfPattern.encode(),
            ],
        );
        let mut dec = PatternDecoder::new();
        let first = dec.decompress_note(&p, 0, 0);
        assert_eq!((first.note, first.volume), (61, 0x20));
        assert!(dec.decompress_note(&p, 1, 0).is_empty());
        let third = dec.decompress_note(&p, 2, 0);
        assert_eq!((third.note, third.volume), (63, 0x20));
    }

    #[test]
    fn advance_rows_and_channel_moves_both() {
        let p = pattern(
            2,
            vec![
                Opcode::AdvanceRowsAndChannel(3).encode(),
                Opcode::ReadNewFields(FIELD_NOTE).encode(),
                97,
                Opcode::EndOfPattern.encode(),
            ],
        );
        let mut dec = PatternDecoder::new();
        assert_eq!(dec.decompress_note(&p, 1, 3).note, 97);
    }

    #[test]
    fn backwards_request_rewinds() {
        let p = pattern(
            2,
            vec![
                Opcode::ReadNewFields(FIELD_NOTE).encode(),
                10,
                Opcode::AdvanceRows(1).encode(),
                Opcode::ReadNewFields(FIELD_NOTE).encode(),
                20,
                Opcode::EndOfPattern.encode(),
            ],
        );
        let mut dec = PatternDecoder::new();
        assert_eq!(dec.decompress_note(&p, 1, 0).note, 20);
        assert_eq!(dec.decompress_note(&p, 0, 0).note, 10);
        assert_eq!(dec.decompress_note(&p, 1, 0).note, 20);
    }

    #[test]
    fn repeated_request_is_stable() {
        let p = pattern(
            1,
            vec![Opcode::ReadNewFields(FIELD_NOTE).encode(), 12, Opcode::EndOfPattern.encode()],
        );
        let mut dec = PatternDecoder::new();
        assert_eq!(dec.decompress_note(&p, 0, 0).note, 12);
        assert_eq!(dec.decompress_note(&p, 0, 0).note, 12);
    }

    #[test]
    fn truncated_stream_ends_pattern() {
        let p = pattern(4, vec![Opcode::ReadNewFields(FIELD_NOTE | FIELD_INSTRUMENT).encode(), 49]);
        let mut dec = PatternDecoder::new();
        assert!(dec.decompress_note(&p, 0, 0).is_empty());
        assert!(dec.decompress_note(&p, 3, 0).is_empty());
    }
}
