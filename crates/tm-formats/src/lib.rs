//! Song loaders for the tickmix tracker.
//!
//! Reads FastTracker 2 XM modules and the engine's own packed song format
//! into the IR. Every loader validates the song before returning it.

mod packed_format;
mod xm_format;

pub use packed_format::{load_packed, write_packed, PACKED_MAGIC, PACKED_VERSION};
pub use xm_format::load_xm;

pub use binrw::Endian;

use tm_ir::SongError;

/// Error type for format parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// Invalid file header or magic bytes
    #[error("invalid file header")]
    InvalidHeader,
    /// Unexpected end of file
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// Unsupported format version
    #[error("unsupported format version 0x{0:04X}")]
    UnsupportedVersion(u16),
    #[error("channel count {0} is outside 1..=32")]
    ChannelCount(u16),
    #[error("pattern {0} is malformed")]
    InvalidPattern(u16),
    #[error("instrument {0} is malformed")]
    InvalidInstrument(u16),
    /// Packed endianness marker was neither `L` nor `B`
    #[error("unknown endianness marker 0x{0:02X}")]
    EndianMarker(u8),
    #[error("malformed data: {0}")]
    Malformed(String),
    #[error(transparent)]
    Song(#[from] SongError),
}

impl From<binrw::Error> for FormatError {
    fn from(e: binrw::Error) -> Self {
        match e {
            binrw::Error::BadMagic { .. } => FormatError::InvalidHeader,
            e if e.is_eof() => FormatError::UnexpectedEof,
            e => FormatError::Malformed(e.to_string()),
        }
    }
}

impl From<std::io::Error> for FormatError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => FormatError::UnexpectedEof,
            _ => FormatError::Malformed(e.to_string()),
        }
    }
}

/// Decode a fixed-size, NUL-padded name field. Non-printable bytes become
/// `?` so the result never grows past the field width.
pub(crate) fn read_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end]
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Encode a name into a fixed-size, NUL-padded field.
pub(crate) fn write_name<const N: usize>(name: &str) -> [u8; N] {
    let mut out = [0u8; N];
    for (dst, src) in out.iter_mut().zip(name.bytes()) {
        *dst = src;
    }
    out
}
