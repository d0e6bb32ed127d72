//! Errors raised while encoding or decoding wire types

/// Error decoding a wire type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The input ended before the value was complete
    #[error("Unexpected end of input, {needed} more bytes are needed")]
    Incomplete {
        /// Number of missing bytes
        needed: usize,
    },

    /// A short string is not valid UTF-8
    #[error("Short string is not valid UTF-8")]
    InvalidUtf8,

    /// A field table or field array holds a value of unknown type
    #[error("Unknown field value type {0:#04x}")]
    UnknownFieldType(u8),

    /// Field tables and arrays are nested deeper than the decoder allows
    #[error("Field values nested deeper than {0} levels")]
    NestingTooDeep(usize),

    /// The (class id, method id) pair is not a known method
    #[error("Unknown method class-id {class_id} method-id {method_id}")]
    UnknownMethod {
        /// Class id found on the wire
        class_id: u16,
        /// Method id found on the wire
        method_id: u16,
    },

    /// Bytes are left over after all method arguments were read
    #[error("{0} trailing bytes after method arguments")]
    TrailingBytes(usize),
}

/// Error encoding a wire type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A short string is longer than 255 bytes
    #[error("Short string of {0} bytes exceeds 255 bytes")]
    ShortStrTooLong(usize),

    /// A long string, table or array is longer than `u32::MAX` bytes
    #[error("Value of {0} bytes exceeds u32::MAX bytes")]
    TooLong(usize),
}
