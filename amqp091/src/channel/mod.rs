//! Implements AMQP 0-9-1 channels
//!
//! A [`Channel`] is a handle. The channel's state lives in the connection event loop, which owns the
//! channel id and resolves replies. Every operation takes `&mut self`, so a handle has at most one request in
//! flight.

use std::time::Duration;

use amqp091_types::{
    definitions::{CloseReason, ReplyCode},
    methods::{channel as methods, Method, MethodId, MethodType},
    primitives::ShortStr,
    states::ChannelState,
};
use tokio::sync::{mpsc, oneshot, watch};

use crate::control::ConnectionControl;

mod error;
pub use error::*;

/// A logical channel multiplexed over a connection
///
/// Created by [`ConnectionHandle::create_channel`](crate::ConnectionHandle::create_channel). A closed channel is
/// never re-opened; create a new one instead.
///
/// Dropping an open channel requests a graceful close in the background.
#[derive(Debug)]
pub struct Channel {
    pub(crate) id: u16,
    pub(crate) control: mpsc::Sender<ConnectionControl>,
    pub(crate) state: watch::Receiver<ChannelState>,
    pub(crate) rpc_timeout: Option<Duration>,
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let ChannelState::Open = self.state() {
            let (reply, _) = oneshot::channel();
            let _ = self.control.try_send(ConnectionControl::CloseChannel {
                channel: self.id,
                reason: CloseReason::default(),
                reply,
            });
        }
    }
}

impl Channel {
    /// Channel number
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Whether the channel is open
    pub fn is_open(&self) -> bool {
        matches!(self.state(), ChannelState::Open)
    }

    /// Closes the channel with `200 "Goodbye"`
    ///
    /// Closing a channel that is already closed does nothing.
    pub async fn close(&mut self) -> Result<(), Error> {
        self.close_with(ReplyCode::ReplySuccess, "Goodbye").await
    }

    /// Closes the channel with the given reply code and text
    ///
    /// Sends `channel.close` and waits for `channel.close-ok`. The id is released once the exchange
    /// completes. If an earlier close was abandoned, this waits for that exchange to complete instead.
    pub async fn close_with(
        &mut self,
        reply_code: impl Into<u16>,
        reply_text: impl Into<ShortStr>,
    ) -> Result<(), Error> {
        match self.state() {
            ChannelState::Closed => return Ok(()),
            ChannelState::Closing => return self.wait_closed().await,
            ChannelState::Open => {}
            state => return Err(Error::IllegalState(state)),
        }

        let (reply, rx) = oneshot::channel();
        let control = ConnectionControl::CloseChannel {
            channel: self.id,
            reason: CloseReason::new(reply_code, reply_text),
            reply,
        };
        if self.control.send(control).await.is_err() {
            // The event loop is gone and the channel with it
            return Ok(());
        }

        match self.wait(rx).await {
            Ok(_) => Ok(()),
            Err(Error::ChannelClosed(_)) | Err(Error::ConnectionClosed(_)) if self.is_closed() => {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Asks the server to pause (`false`) or resume (`true`) deliveries on this channel
    ///
    /// Returns the flow state confirmed by the server.
    pub async fn flow(&mut self, active: bool) -> Result<bool, Error> {
        match self
            .call(methods::Flow { active }, &[methods::FlowOk::ID])
            .await?
        {
            Method::ChannelFlowOk(flow_ok) => Ok(flow_ok.active),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Sends a synchronous method on this channel and waits for one of the `expected` replies
    ///
    /// Resolves with the reply, or fails if the channel or connection closes first or the connection's RPC
    /// timeout elapses. A timeout only abandons the request; the channel stays open.
    pub async fn call(
        &mut self,
        method: impl Into<Method>,
        expected: &[MethodId],
    ) -> Result<Method, Error> {
        self.ensure_open()?;

        let (reply, rx) = oneshot::channel();
        let control = ConnectionControl::Rpc {
            channel: self.id,
            method: method.into(),
            expected: expected.to_vec(),
            reply,
        };
        self.control
            .send(control)
            .await
            .map_err(|_| Error::ConnectionClosed(None))?;
        self.wait(rx).await
    }

    /// Waits until the close in progress completes, bounded by the RPC timeout
    async fn wait_closed(&mut self) -> Result<(), Error> {
        let timeout = self.rpc_timeout;
        let closed = async {
            // An error means the event loop is gone and the channel with it
            let _ = self.state.wait_for(|state| state.is_closed()).await;
        };
        match timeout {
            Some(duration) => tokio::time::timeout(duration, closed)
                .await
                .map_err(|_| Error::Timeout),
            None => {
                closed.await;
                Ok(())
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    fn ensure_open(&self) -> Result<(), Error> {
        match self.state() {
            ChannelState::Open => Ok(()),
            ChannelState::Closed if self.control.is_closed() => Err(Error::ConnectionClosed(None)),
            ChannelState::Closed => Err(Error::ChannelClosed(None)),
            state => Err(Error::IllegalState(state)),
        }
    }

    async fn wait(
        &self,
        rx: oneshot::Receiver<Result<Method, Error>>,
    ) -> Result<Method, Error> {
        recv_reply(&self.control, self.id, rx, self.rpc_timeout).await
    }
}

/// Waits for the reply of a request, cancelling the request if the timeout elapses first
pub(crate) async fn recv_reply(
    control: &mpsc::Sender<ConnectionControl>,
    channel: u16,
    rx: oneshot::Receiver<Result<Method, Error>>,
    timeout: Option<Duration>,
) -> Result<Method, Error> {
    let result = match timeout {
        Some(duration) => match tokio::time::timeout(duration, rx).await {
            Ok(result) => result,
            Err(_) => {
                let _ = control.send(ConnectionControl::CancelRpc { channel }).await;
                return Err(Error::Timeout);
            }
        },
        None => rx.await,
    };

    // The responder is dropped only when the event loop stops
    result.map_err(|_| Error::ConnectionClosed(None))?
}
