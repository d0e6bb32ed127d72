//! Controls sent from the handles to the connection event loop

use amqp091_types::{
    definitions::CloseReason,
    methods::{Method, MethodId},
    states::ChannelState,
};
use tokio::sync::{oneshot, watch};

use crate::{channel, rpc::Responder};

/// What the event loop hands back when a channel id has been allocated
pub(crate) type ChannelSlotResult = Result<(u16, watch::Receiver<ChannelState>), channel::Error>;

#[derive(Debug)]
pub(crate) enum ConnectionControl {
    /// Start the close handshake. A close already in progress is not repeated
    Close(CloseReason),

    /// Allocate an id and send `channel.open`. `responder` gets the id right away and `reply` gets the
    /// `channel.open-ok`
    OpenChannel {
        responder: oneshot::Sender<ChannelSlotResult>,
        reply: Responder,
    },

    /// Send `channel.close` and wait for `channel.close-ok`
    CloseChannel {
        channel: u16,
        reason: CloseReason,
        reply: Responder,
    },

    /// Send a synchronous method on an open channel
    Rpc {
        channel: u16,
        method: Method,
        expected: Vec<MethodId>,
        reply: Responder,
    },

    /// The caller stopped waiting
    CancelRpc { channel: u16 },
}
