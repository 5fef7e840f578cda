//! Pattern and note types for tracker sequences.

use alloc::vec::Vec;

use crate::effects::{Effect, VolumeCommand};

/// Highest playable note value (B-7).
pub const MAX_NOTE: u8 = 96;

/// Note-off (key release) note value.
pub const NOTE_OFF: u8 = 97;

/// Empty marker for the instrument, volume and command fields of a [`Note`].
pub const EMPTY: u8 = 0xFF;

/// Highest XM effect command (`X`, extra fine portamento).
pub const MAX_COMMAND: u8 = 0x21;

/// Maximum rows in a pattern.
pub const MAX_ROWS: u16 = 256;

/// What the note column of a [`Note`] asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NoteKey {
    /// No note
    #[default]
    None,
    /// Note on (1-96, 49 = C-4)
    On(u8),
    /// Note off / key release
    Off,
}

/// A decoded pattern note.
///
/// Field conventions follow the pattern codec: `note` is 0 when empty,
/// `instrument` is zero-based, `volume` is the raw column byte minus 0x10,
/// and `instrument`/`volume`/`command` hold [`EMPTY`] when absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Note {
    pub note: u8,
    pub instrument: u8,
    pub volume: u8,
    pub command: u8,
    pub parameter: u8,
}

impl Default for Note {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Note {
    /// A note with every field empty.
    pub const EMPTY: Note = Note {
        note: 0,
        instrument: EMPTY,
        volume: EMPTY,
        command: EMPTY,
        parameter: 0,
    };

    /// Sanitize a raw XM cell into decoded form. Commands past
    /// [`MAX_COMMAND`] are not XM effects and decode as empty, parameter
    /// included.
    pub fn from_cell(cell: &Cell) -> Self {
        let (command, parameter) = if cell.command > MAX_COMMAND || (cell.command == 0 && cell.parameter == 0) {
            (EMPTY, 0)
        } else {
            (cell.command, cell.parameter)
        };
        Self {
            note: if cell.note > NOTE_OFF { 0 } else { cell.note },
            instrument: if cell.instrument == 0 { EMPTY } else { cell.instrument - 1 },
            volume: if cell.volume < 0x10 { EMPTY } else { cell.volume - 0x10 },
            command,
            parameter,
        }
    }

    /// Returns true if the note carries no data.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Interpret the note column.
    pub fn key(&self) -> NoteKey {
        match self.note {
            0 => NoteKey::None,
            NOTE_OFF => NoteKey::Off,
            n if n <= MAX_NOTE => NoteKey::On(n),
            _ => NoteKey::None,
        }
    }

    /// Zero-based instrument index, if present.
    pub fn instrument(&self) -> Option<u8> {
        (self.instrument != EMPTY).then_some(self.instrument)
    }

    /// Decoded volume column command.
    pub fn volume_command(&self) -> VolumeCommand {
        VolumeCommand::from_byte(self.volume)
    }

    /// Decoded effect column.
    pub fn effect(&self) -> Effect {
        if self.command == EMPTY {
            Effect::None
        } else {
            Effect::from_raw(self.command, self.parameter)
        }
    }
}

/// A raw pattern cell in XM file convention.
///
/// `instrument` is one-based with 0 meaning none, `volume` is the raw
/// volume column byte (values below 0x10 mean none).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cell {
    pub note: u8,
    pub instrument: u8,
    pub volume: u8,
    pub command: u8,
    pub parameter: u8,
}

impl Cell {
    /// Create an empty cell.
    pub const fn empty() -> Self {
        Self {
            note: 0,
            instrument: 0,
            volume: 0,
            command: 0,
            parameter: 0,
        }
    }

    /// Create a cell with a note and one-based instrument.
    pub const fn note(note: u8, instrument: u8) -> Self {
        Self {
            note,
            instrument,
            volume: 0,
            command: 0,
            parameter: 0,
        }
    }

    /// Returns true if the cell is completely empty.
    pub fn is_empty(&self) -> bool {
        Note::from_cell(self).is_empty()
    }
}

/// An uncompressed pattern: rows of cells across channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternGrid {
    /// Number of rows (1-256)
    pub rows: u16,
    /// Number of channels
    pub channels: u8,
    /// Pattern data, stored row-major: data[row * channels + channel]
    pub data: Vec<Cell>,
}

impl PatternGrid {
    /// Create a new pattern with empty cells.
    pub fn new(rows: u16, channels: u8) -> Self {
        Self {
            rows,
            channels,
            data: alloc::vec![Cell::empty(); rows as usize * channels as usize],
        }
    }

    /// Get a reference to a cell.
    pub fn cell(&self, row: u16, channel: u8) -> &Cell {
        debug_assert!(row < self.rows);
        debug_assert!(channel < self.channels);
        &self.data[row as usize * self.channels as usize + channel as usize]
    }

    /// Get a mutable reference to a cell.
    pub fn cell_mut(&mut self, row: u16, channel: u8) -> &mut Cell {
        debug_assert!(row < self.rows);
        debug_assert!(channel < self.channels);
        &mut self.data[row as usize * self.channels as usize + channel as usize]
    }

    /// All cells in a row.
    pub fn row(&self, row: u16) -> &[Cell] {
        let start = row as usize * self.channels as usize;
        &self.data[start..start + self.channels as usize]
    }
}

/// A pattern in compressed form, as consumed by the pattern decoder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompressedPattern {
    /// Number of rows (1-256)
    pub rows: u16,
    /// Opcode byte stream
    pub data: Vec<u8>,
}

impl CompressedPattern {
    /// An empty pattern with the given row count.
    pub fn empty(rows: u16) -> Self {
        Self { rows, data: alloc::vec![crate::pattern_codec::Opcode::EndOfPattern.encode()] }
    }
}
