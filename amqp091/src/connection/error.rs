//! Implements errors associated with the connection

use std::io;

use amqp091_types::{definitions::CloseReason, states::ConnectionState};
use tokio::task::JoinError;

use crate::frames;

/// Errors associated with [`crate::Connection`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// Frame codec error
    #[error(transparent)]
    Frame(frames::Error),

    /// The server sent a method that is not allowed at this point of the handshake or close sequence
    #[error("Protocol violation: expected {expected}, found {found}")]
    ProtocolViolation {
        /// What was expected
        expected: &'static str,

        /// What arrived instead
        found: String,
    },

    /// The server does not offer the SASL mechanism of the configured profile
    #[error("SASL mechanism {mechanism} is not offered by the server (offered: {offered:?})")]
    UnsupportedMechanism {
        /// Mechanism of the configured profile
        mechanism: &'static str,

        /// Mechanisms offered by the server
        offered: Vec<String>,
    },

    /// The connection is closed. Carries the reason if the server closed it
    #[error("Connection is closed {0:?}")]
    ConnectionClosed(Option<CloseReason>),

    /// The server closed the connection with an error
    #[error("Remote error {0}")]
    Remote(CloseReason),

    /// Nothing was received from the server for two heartbeat intervals
    #[error("Missed heartbeats from the server")]
    MissedHeartbeats,

    /// The operation is not allowed in the current state
    #[error("Illegal connection state {0:?}")]
    IllegalState(ConnectionState),

    /// This could occur only when the user attempts to close the connection
    #[error(transparent)]
    JoinError(JoinError),

    /// The url could not be parsed or lacks a host
    #[error("Invalid url: {0}")]
    InvalidUrl(String),
}

impl From<frames::Error> for Error {
    fn from(err: frames::Error) -> Self {
        match err {
            frames::Error::Io(e) => Self::Io(e),
            err => Self::Frame(err),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl Error {
    pub(crate) fn protocol_violation(expected: &'static str, found: impl ToString) -> Self {
        Self::ProtocolViolation {
            expected,
            found: found.to_string(),
        }
    }
}
