use thiserror::Error;

#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("unexpected byte 0x{byte:02x} at offset {offset}")]
    UnexpectedByte { byte: u8, offset: u64 },

    #[error("unbalanced delimiter at offset {offset}")]
    UnbalancedDelimiter { offset: u64 },

    #[error("incomplete stream")]
    IncompleteStream,

    #[error("negative zero is not a valid integer")]
    NegativeZero,

    #[error("leading zeros are not allowed")]
    LeadingZeros,

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid string length")]
    InvalidStringLength,

    #[error("unexpected token: {0}")]
    UnexpectedToken(&'static str),

    #[error("trailing data after value")]
    TrailingData,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BencodeError {
    /// Returns true for malformed input, false for failures of the
    /// underlying reader.
    pub fn is_syntax(&self) -> bool {
        !matches!(self, BencodeError::Io(_))
    }
}
