//! Error types for section building and parsing.

use thiserror::Error;

/// Raised by builders before any byte is handed to a sender.
#[derive(Error, Debug)]
pub enum BuildError {
    /// `section_length` would not fit the 12-bit field.
    #[error("section too large: section_length {0} (max 4093)")]
    SectionTooLarge(usize),

    /// CA descriptor private data does not fit the descriptor.
    #[error("CA private data too long: {0} bytes (max 251)")]
    PrivateDataTooLong(usize),

    /// Descriptor payload exceeds the 8-bit length field.
    #[error("descriptor payload too long: {0} bytes (max 255)")]
    DescriptorTooLong(usize),

    #[error("invalid hex input: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("PID 0x{0:04X} out of range")]
    InvalidPid(u16),

    /// Logical channel number does not fit 10 bits.
    #[error("LCN {0} out of range (max 1023)")]
    LcnOutOfRange(u16),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why a section could not be interpreted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("buffer too short")]
    ShortBuffer,

    #[error("CRC-32 mismatch: section carries 0x{expected:08X}, computed 0x{computed:08X}")]
    CrcMismatch { expected: u32, computed: u32 },

    #[error("unexpected table_id 0x{found:02X} (expected 0x{expected:02X})")]
    WrongTableId { expected: u8, found: u8 },

    /// A declared length points past the end of the buffer.
    #[error("declared length overruns buffer")]
    LengthOverrun,

    /// A field holds a value outside its legal range (e.g. non-BCD time digits).
    #[error("invalid {0} field")]
    InvalidField(&'static str),
}

impl ParseError {
    /// `true` when a later section may still succeed ("not yet captured"),
    /// `false` when this section is corrupt and will never validate.
    pub fn is_not_yet_available(&self) -> bool {
        matches!(self, ParseError::ShortBuffer | ParseError::WrongTableId { .. })
    }
}
