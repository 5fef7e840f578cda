//! Pattern compressor: the inverse of [`PatternDecoder`](crate::PatternDecoder).

use alloc::vec::Vec;

use crate::pattern::{CompressedPattern, Note, PatternGrid};
use crate::pattern_codec::{Opcode, EMPTY_FIELDS, FIELD_COUNT, MAX_CODEC_CHANNELS, MAX_ROW_ADVANCE};

/// Encodes [`PatternGrid`]s into compressed opcode streams.
///
/// The field cache mirrors the decoder's, so a field is emitted as a cache
/// hit exactly when the decoder would reproduce it from its own cache.
pub struct PatternCompressor {
    cache: [[u8; FIELD_COUNT]; MAX_CODEC_CHANNELS],
    out: Vec<u8>,
    row: u16,
    channel: u8,
    /// The last record was a cache-only cell; a following `ReadNewFields`
    /// would be merged into it.
    cached_tail: bool,
}

impl PatternCompressor {
    /// Compress a grid. Channels past the 32 addressable ones are dropped.
    pub fn compress(grid: &PatternGrid) -> CompressedPattern {
        let mut enc = Self {
            cache: [EMPTY_FIELDS; MAX_CODEC_CHANNELS],
            out: Vec::new(),
            row: 0,
            channel: 0,
            cached_tail: false,
        };
        let channels = (grid.channels as usize).min(MAX_CODEC_CHANNELS) as u8;
        for row in 0..grid.rows {
            for channel in 0..channels {
                let note = Note::from_cell(grid.cell(row, channel));
                if !note.is_empty() {
                    enc.emit_cell(row, channel, &note);
                }
            }
        }
        enc.out.push(Opcode::EndOfPattern.encode());
        CompressedPattern { rows: grid.rows, data: enc.out }
    }

    /// Move the cursor to (row, channel). Returns true if any record was written.
    fn seek(&mut self, row: u16, channel: u8) -> bool {
        let mut moved = false;
        if row != self.row {
            let mut remaining = row - self.row;
            if remaining == 1 && channel != 0 {
                self.out.push(Opcode::AdvanceRowsAndChannel(channel).encode());
                self.row = row;
                self.channel = channel;
                return true;
            }
            while remaining > 0 {
                let step = remaining.min(MAX_ROW_ADVANCE as u16) as u8;
                self.out.push(Opcode::AdvanceRows(step).encode());
                remaining -= step as u16;
            }
            self.row = row;
            self.channel = 0;
            moved = true;
        }
        if channel != self.channel {
            self.out.push(Opcode::SeekChannel(channel).encode());
            self.channel = channel;
            moved = true;
        }
        moved
    }

    fn emit_cell(&mut self, row: u16, channel: u8, note: &Note) {
        let fields = [note.note, note.instrument, note.volume, note.command, note.parameter];
        let cache = &mut self.cache[channel as usize];
        let mut cached_mask = 0u8;
        let mut new_mask = 0u8;
        let mut new_bytes = [0u8; FIELD_COUNT];
        let mut new_len = 0;
        for (bit, &value) in fields.iter().enumerate() {
            if value == EMPTY_FIELDS[bit] {
                continue;
            }
            if cache[bit] == value {
                cached_mask |= 1 << bit;
            } else {
                new_mask |= 1 << bit;
                new_bytes[new_len] = value;
                new_len += 1;
                cache[bit] = value;
            }
        }

        let moved = self.seek(row, channel);
        if !moved && cached_mask == 0 && self.cached_tail {
            self.out.push(Opcode::SeekChannel(channel).encode());
        }
        if cached_mask != 0 {
            self.out.push(Opcode::UseCachedFields(cached_mask).encode());
        }
        if new_mask != 0 {
            self.out.push(Opcode::ReadNewFields(new_mask).encode());
            self.out.extend_from_slice(&new_bytes[..new_len]);
        }
        self.cached_tail = new_mask == 0;
        self.channel += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Cell;
    use crate::pattern_codec::PatternDecoder;

    fn assert_roundtrip(grid: &PatternGrid) -> CompressedPattern {
        let packed = PatternCompressor::compress(grid);
        let mut dec = PatternDecoder::new();
        for row in 0..grid.rows {
            for ch in 0..grid.channels {
                let expected = Note::from_cell(grid.cell(row, ch));
                assert_eq!(dec.decompress_note(&packed, row, ch), expected, "row {row} ch {ch}");
            }
        }
        packed
    }

    /// Deterministic pseudo-random grid with repeated fields so the cache
    /// gets exercised.
    fn noisy_grid(rows: u16, channels: u8, seed: u32) -> PatternGrid {
        let mut grid = PatternGrid::new(rows, channels);
        let mut state = seed;
        let mut next = move || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        };
        for row in 0..rows {
            for ch in 0..channels {
                if next() % 3 != 0 {
                    continue;
                }
                let cell = grid.cell_mut(row, ch);
                cell.note = next() % 100;
                cell.instrument = next() % 4;
                cell.volume = if next() % 2 == 0 { 0x10 + next() % 0x41 } else { 0 };
                cell.command = next() % 3;
                cell.parameter = next() % 4;
            }
        }
        grid
    }

    #[test]
    fn empty_grid_is_single_end_opcode() {
        let grid = PatternGrid::new(64, 8);
        let packed = assert_roundtrip(&grid);
        assert_eq!(packed, CompressedPattern::empty(64));
    }

    #[test]
    fn single_note_roundtrip() {
        let mut grid = PatternGrid::new(4, 1);
        *grid.cell_mut(0, 0) = Cell { note: 49, instrument: 1, volume: 0x50, command: 0, parameter: 0 };
        let packed = assert_roundtrip(&grid);
        // ReadNewFields(note|instrument|volume) + 3 bytes + end
        assert_eq!(packed.data.len(), 5);
    }

    #[test]
    fn long_gaps_chain_row_advances() {
        let mut grid = PatternGrid::new(256, 2);
        grid.cell_mut(0, 0).note = 1;
        grid.cell_mut(200, 1).note = 2;
        let packed = assert_roundtrip(&grid);
        let advances = packed
            .data
            .iter()
            .filter(|&&b| matches!(Opcode::decode(b), Some(Opcode::AdvanceRows(_))))
            .count();
        assert_eq!(advances, 7);
    }

    #[test]
    fn next_row_nonzero_channel_uses_combined_opcode() {
        let mut grid = PatternGrid::new(2, 4);
        grid.cell_mut(0, 0).note = 1;
        grid.cell_mut(1, 3).note = 2;
        let packed = assert_roundtrip(&grid);
        assert!(packed.data.contains(&Opcode::AdvanceRowsAndChannel(3).encode()));
    }

    #[test]
    fn repeated_fields_hit_the_cache() {
        let mut grid = PatternGrid::new(2, 1);
        *grid.cell_mut(0, 0) = Cell::note(49, 2);
        *grid.cell_mut(1, 0) = Cell::note(49, 2);
        let packed = assert_roundtrip(&grid);
        assert!(packed.data.contains(&Opcode::UseCachedFields(0b11).encode()));
    }

    #[test]
    fn cache_only_cell_followed_by_adjacent_new_cell() {
        let mut grid = PatternGrid::new(2, 2);
        *grid.cell_mut(0, 0) = Cell::note(10, 0);
        *grid.cell_mut(1, 0) = Cell::note(10, 0);
        *grid.cell_mut(1, 1) = Cell::note(20, 0);
        assert_roundtrip(&grid);
    }

    #[test]
    fn sanitization_collapses_out_of_range_values() {
        let mut grid = PatternGrid::new(1, 3);
        *grid.cell_mut(0, 0) = Cell { note: 200, instrument: 0, volume: 0x05, command: 0, parameter: 0 };
        *grid.cell_mut(0, 1) = Cell { note: 97, ..Cell::empty() };
        *grid.cell_mut(0, 2) = Cell { command: 0x0F, parameter: 0, ..Cell::empty() };
        assert_roundtrip(&grid);
    }

    #[test]
    fn noisy_grids_roundtrip() {
        for seed in 1..6 {
            assert_roundtrip(&noisy_grid(64, 8, seed));
        }
        assert_roundtrip(&noisy_grid(256, 32, 99));
    }

    #[test]
    fn random_access_after_compress() {
        let grid = noisy_grid(64, 6, 7);
        let packed = PatternCompressor::compress(&grid);
        let mut dec = PatternDecoder::new();
        for &(row, ch) in &[(40u16, 3u8), (2, 5), (63, 0), (0, 0), (40, 3), (41, 1)] {
            assert_eq!(dec.decompress_note(&packed, row, ch), Note::from_cell(grid.cell(row, ch)));
        }
    }
}
