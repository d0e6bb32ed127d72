use amqp091_types::{definitions::CloseReason, states::ChannelState, EncodeError};

use crate::allocator::ExhaustedError;

/// Errors associated with [`crate::Channel`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The server answered `channel.open` with `channel.close`
    #[error("Server refused to open the channel: {0}")]
    ChannelOpenFailed(CloseReason),

    /// The channel has been closed. Carries the reason if the server closed it
    #[error("Channel is closed {0:?}")]
    ChannelClosed(Option<CloseReason>),

    /// The connection has been closed. Carries the reason if the server closed it
    #[error("Connection is closed {0:?}")]
    ConnectionClosed(Option<CloseReason>),

    /// No channel id is available
    #[error(transparent)]
    Exhausted(#[from] ExhaustedError),

    /// Another request on the same channel is still waiting for its reply
    #[error("A request is already waiting for a reply on channel {0}")]
    RpcInProgress(u16),

    /// No reply arrived before the configured timeout
    #[error("Timed out waiting for a reply")]
    Timeout,

    /// The operation is not allowed in the current state
    #[error("Illegal channel state {0:?}")]
    IllegalState(ChannelState),

    /// A method other than the expected replies arrived while waiting
    #[error("Unexpected reply {0}")]
    UnexpectedReply(&'static str),

    /// The request could not be encoded
    #[error(transparent)]
    Encode(#[from] EncodeError),
}
