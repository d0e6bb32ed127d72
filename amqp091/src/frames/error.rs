use std::io;

use amqp091_types::{DecodeError, EncodeError};

/// Errors of the frame codec
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// The frame does not follow the wire format
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The (class id, method id) pair is not known
    #[error("Unknown method {class_id}.{method_id}")]
    UnknownMethod {
        /// Class id found in the method payload
        class_id: u16,

        /// Method id found in the method payload
        method_id: u16,
    },

    /// The frame is larger than the negotiated frame-max
    #[error("Frame of {size} bytes exceeds the max frame size {max}")]
    MaxFrameSizeExceeded {
        /// Total size of the offending frame
        size: usize,

        /// Negotiated max frame size
        max: usize,
    },

    /// The server answered the protocol header with its own protocol header,
    /// which means it does not support the version
    #[error("Server replied with protocol header {0:?}")]
    ProtocolHeaderMismatch([u8; 8]),

    /// A method could not be encoded
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnknownMethod {
                class_id,
                method_id,
            } => Self::UnknownMethod {
                class_id,
                method_id,
            },
            err => Self::MalformedFrame(err.to_string()),
        }
    }
}
