//! Definition of connection state and channel state

/// Connection states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The connection exists but nothing has been sent yet
    Unstarted,

    /// The protocol header has been sent and the handshake
    /// (start, tune, open) is in progress
    Opening,

    /// `connection.open-ok` has been received. Channels may be created
    Open,

    /// A `connection.close` has been sent (or received) and the
    /// matching `close-ok` is outstanding
    Closing,

    /// The close exchange has completed or the transport is gone. Terminal
    Closed,
}

impl ConnectionState {
    /// Whether the state is terminal
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

/// Channel states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// `channel.open` has been sent
    Opening,

    /// `channel.open-ok` has been received
    Open,

    /// `channel.close` has been sent
    Closing,

    /// The channel is closed and its id released. A closed channel is never re-opened
    Closed,
}

impl ChannelState {
    /// Whether the state is terminal
    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelState::Closed)
    }
}
