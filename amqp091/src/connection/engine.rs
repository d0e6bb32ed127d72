//! The engine owns the transport and the connection state. It runs the handshake, then multiplexes
//! inbound frames, controls from the handles and heartbeats in a single task

use amqp091_types::{
    definitions::{CloseReason, ReplyCode, CONNECTION_CHANNEL, MAJOR, MINOR},
    methods::{channel as channel_methods, connection as connection_methods, Method},
    primitives::{FieldTable, LongStr},
    states::{ChannelState, ConnectionState},
    EncodeError,
};
use futures_util::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc::Receiver,
    task::JoinHandle,
    time::Instant,
};

use crate::{
    channel,
    control::ConnectionControl,
    frames::{self, Frame, FrameBody},
    rpc::{Delivery, Waiter},
    transport::{protocol_header::ProtocolHeader, Transport},
    util::Running,
};

use super::{
    channel_close_replies, channel_open_replies, heartbeat::HeartBeat, Builder, Connection,
    Error, Tuning, DEFAULT_FRAME_MAX,
};

pub(crate) struct ConnectionEngine<Io> {
    transport: Transport<Io>,
    connection: Connection,
    control: Receiver<ConnectionControl>,
    control_closed: bool,
    heartbeat: HeartBeat,
    last_received: Instant,
}

impl<Io> ConnectionEngine<Io>
where
    Io: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Runs the handshake without starting the Engine::event_loop()
    pub(crate) async fn open(
        mut io: Io,
        config: &Builder,
        connection: Connection,
        control: Receiver<ConnectionControl>,
    ) -> Result<Self, Error> {
        connection.set_local_state(ConnectionState::Opening);
        if let Err(err) = Transport::send_proto_header(&mut io, ProtocolHeader::default()).await {
            connection.set_local_state(ConnectionState::Closed);
            return Err(err.into());
        }

        let mut engine = Self {
            transport: Transport::bind(io, DEFAULT_FRAME_MAX as usize),
            connection,
            control,
            control_closed: false,
            heartbeat: HeartBeat::never(),
            last_received: Instant::now(),
        };

        match engine.handshake(config).await {
            Ok(()) => {
                engine.connection.set_local_state(ConnectionState::Open);
                engine.heartbeat = HeartBeat::new(engine.connection.tuning().heartbeat);
                engine.last_received = Instant::now();
                Ok(engine)
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = ?err, "handshake failed");
                #[cfg(feature = "log")]
                log::error!("handshake failed: {:?}", err);

                engine.connection.on_closed();
                Err(err)
            }
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<Result<(), Error>> {
        tokio::spawn(self.event_loop())
    }

    pub(crate) fn tuning(&self) -> Tuning {
        self.connection.tuning()
    }

    pub(crate) fn server_properties(&self) -> &FieldTable {
        self.connection.server_properties()
    }

    /// start / start-ok, [secure / secure-ok]*, tune / tune-ok, open / open-ok
    async fn handshake(&mut self, config: &Builder) -> Result<(), Error> {
        let profile = config.profile();

        let start = match self.recv_handshake_method("connection.start").await? {
            Method::ConnectionStart(start) => start,
            other => return Err(Error::protocol_violation("connection.start", other.name())),
        };
        if (start.version_major, start.version_minor) != (MAJOR, MINOR) {
            return Err(Error::protocol_violation(
                "protocol version 0-9",
                format!("{}-{}", start.version_major, start.version_minor),
            ));
        }
        let offered = start.mechanisms();
        if !offered.iter().any(|m| m == profile.mechanism()) {
            return Err(Error::UnsupportedMechanism {
                mechanism: profile.mechanism(),
                offered,
            });
        }
        self.connection.server_properties = start.server_properties;

        let start_ok = connection_methods::StartOk {
            client_properties: config.client_properties.clone(),
            mechanism: profile.mechanism().into(),
            response: LongStr::from(profile.initial_response()),
            locale: config.locale.clone().into(),
        };
        self.send_method(CONNECTION_CHANNEL, start_ok).await?;

        let tune = loop {
            match self.recv_handshake_method("connection.tune").await? {
                Method::ConnectionSecure(secure) => {
                    let secure_ok = connection_methods::SecureOk {
                        response: LongStr::from(profile.on_challenge(secure.challenge.as_bytes())),
                    };
                    self.send_method(CONNECTION_CHANNEL, secure_ok).await?;
                }
                Method::ConnectionTune(tune) => break tune,
                other => return Err(Error::protocol_violation("connection.tune", other.name())),
            }
        };

        let tuning = Tuning::negotiate(config.preferred_tuning(), &tune);
        let tune_ok = connection_methods::TuneOk {
            channel_max: tuning.channel_max,
            frame_max: tuning.frame_max,
            heartbeat: tuning.heartbeat,
        };
        self.send_method(CONNECTION_CHANNEL, tune_ok).await?;
        self.transport.set_max_frame_size(tuning.codec_frame_max());
        self.connection.on_tuned(tuning);

        let open = connection_methods::Open::new(config.vhost.as_str());
        self.send_method(CONNECTION_CHANNEL, open).await?;
        match self.recv_handshake_method("connection.open-ok").await? {
            Method::ConnectionOpenOk(_) => Ok(()),
            other => Err(Error::protocol_violation("connection.open-ok", other.name())),
        }
    }

    /// Next method on channel 0 during the handshake
    ///
    /// A server `connection.close` is acknowledged and ends the handshake.
    async fn recv_handshake_method(&mut self, expected: &'static str) -> Result<Method, Error> {
        loop {
            let frame = match self.transport.next().await {
                Some(frame) => frame?,
                None => return Err(Error::ConnectionClosed(None)),
            };
            Self::trace_incoming(&frame);

            let Frame { channel, body } = frame;
            match (channel, body) {
                (_, FrameBody::Heartbeat) => continue,
                (CONNECTION_CHANNEL, FrameBody::Method(Method::ConnectionClose(close))) => {
                    let reason = close.reason();
                    let _ = self
                        .send_method(CONNECTION_CHANNEL, connection_methods::CloseOk {})
                        .await;
                    let _ = self.transport.shutdown().await;
                    self.connection.remote_close = Some(reason.clone());
                    return Err(Error::ConnectionClosed(Some(reason)));
                }
                (CONNECTION_CHANNEL, FrameBody::Method(method)) => return Ok(method),
                (channel, _) => {
                    return Err(Error::protocol_violation(
                        expected,
                        format!("frame on channel {}", channel),
                    ))
                }
            }
        }
    }

    async fn send_method(&mut self, channel: u16, method: impl Into<Method>) -> Result<(), Error> {
        let frame = Frame::method(channel, method);
        self.send_frame(frame).await
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), Error> {
        Self::trace_outgoing(&frame);
        self.transport.send(frame).await.map_err(Into::into)
    }

    fn trace_incoming(frame: &Frame) {
        #[cfg(feature = "tracing")]
        tracing::trace!(channel = frame.channel, frame = ?frame.body, "RECV");
        #[cfg(feature = "log")]
        log::trace!("RECV channel = {}, frame = {:?}", frame.channel, frame.body);
        let _ = frame;
    }

    fn trace_outgoing(frame: &Frame) {
        #[cfg(feature = "tracing")]
        tracing::trace!(channel = frame.channel, frame = ?frame.body, "SEND");
        #[cfg(feature = "log")]
        log::trace!("SEND channel = {}, frame = {:?}", frame.channel, frame.body);
        let _ = frame;
    }
}

impl<Io> ConnectionEngine<Io>
where
    Io: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn on_incoming(
        &mut self,
        incoming: Result<Frame, frames::Error>,
    ) -> Result<Running, Error> {
        let frame = match incoming {
            Ok(frame) => frame,
            Err(err) => return self.on_codec_error(err).await,
        };
        self.last_received = Instant::now();
        Self::trace_incoming(&frame);

        let Frame { channel, body } = frame;
        match body {
            FrameBody::Heartbeat => Ok(Running::Continue),
            FrameBody::Method(method) if channel == CONNECTION_CHANNEL => {
                self.on_connection_method(method).await
            }
            FrameBody::Method(method) => self.on_channel_method(channel, method).await,
            FrameBody::Header(_) | FrameBody::Body(_) => {
                if self.connection.channel(channel).is_none() {
                    Self::warn_unknown_channel(channel, "content frame");
                }
                // Content delivery is not handled by this crate
                Ok(Running::Continue)
            }
        }
    }

    /// Fatal decode errors close the connection with the matching reply code before stopping
    async fn on_codec_error(&mut self, err: frames::Error) -> Result<Running, Error> {
        let reply_code = match &err {
            frames::Error::MalformedFrame(_) | frames::Error::MaxFrameSizeExceeded { .. } => {
                Some(ReplyCode::FrameError)
            }
            frames::Error::UnknownMethod { .. } => Some(ReplyCode::NotImplemented),
            frames::Error::Io(_)
            | frames::Error::ProtocolHeaderMismatch(_)
            | frames::Error::Encode(_) => None,
        };

        if let Some(reply_code) = reply_code {
            if matches!(self.connection.local_state(), ConnectionState::Open) {
                let close = connection_methods::Close::new(reply_code, reply_code.name());
                let _ = self.send_method(CONNECTION_CHANNEL, close).await;
            }
        }
        Err(err.into())
    }

    async fn on_connection_method(&mut self, method: Method) -> Result<Running, Error> {
        match method {
            Method::ConnectionClose(close) => {
                let reason = close.reason();
                #[cfg(feature = "tracing")]
                tracing::debug!(%reason, "server closed the connection");
                #[cfg(feature = "log")]
                log::debug!("server closed the connection: {}", reason);

                self.connection.remote_close = Some(reason);
                self.send_method(CONNECTION_CHANNEL, connection_methods::CloseOk {})
                    .await?;
                self.transport.shutdown().await?;
                self.connection.on_closed();
                Ok(Running::Stop)
            }
            Method::ConnectionCloseOk(_) => match self.connection.local_state() {
                ConnectionState::Closing => {
                    self.transport.shutdown().await?;
                    self.connection.on_closed();
                    Ok(Running::Stop)
                }
                state => {
                    Self::warn_unexpected(CONNECTION_CHANNEL, "connection.close-ok", state);
                    Ok(Running::Continue)
                }
            },
            Method::ConnectionBlocked(blocked) => {
                self.connection.set_blocked(Some(blocked.reason));
                Ok(Running::Continue)
            }
            Method::ConnectionUnblocked(_) => {
                self.connection.set_blocked(None);
                Ok(Running::Continue)
            }
            other => {
                Self::warn_unexpected(
                    CONNECTION_CHANNEL,
                    other.name(),
                    self.connection.local_state(),
                );
                Ok(Running::Continue)
            }
        }
    }

    async fn on_channel_method(&mut self, channel: u16, method: Method) -> Result<Running, Error> {
        if let ConnectionState::Closing = self.connection.local_state() {
            // Everything but close and close-ok is discarded after sending connection.close
            return Ok(Running::Continue);
        }

        let slot_state = match self.connection.channel(channel) {
            Some(slot) => slot.state(),
            None => {
                Self::warn_unknown_channel(channel, method.name());
                return Ok(Running::Continue);
            }
        };

        match method {
            Method::ChannelClose(close) => {
                let reason = close.reason();
                self.send_method(channel, channel_methods::CloseOk {}).await?;
                self.connection.release_channel(channel);
                match slot_state {
                    // Both sides closed at the same time
                    ChannelState::Closing => {
                        self.connection
                            .rpc
                            .deliver(channel, channel_methods::CloseOk {}.into());
                    }
                    _ => {
                        self.connection
                            .rpc
                            .fail(channel, channel::Error::ChannelClosed(Some(reason)));
                    }
                }
            }
            Method::ChannelCloseOk(close_ok) => {
                if let ChannelState::Closing = slot_state {
                    self.connection.release_channel(channel);
                    self.connection.rpc.deliver(channel, close_ok.into());
                } else {
                    self.on_unsolicited(channel, close_ok.into());
                }
            }
            _ if matches!(slot_state, ChannelState::Closing) => {
                // Everything but close and close-ok is discarded after sending channel.close
            }
            Method::ChannelFlow(flow) => {
                let flow_ok = channel_methods::FlowOk {
                    active: flow.active,
                };
                self.send_method(channel, flow_ok).await?;
            }
            Method::ChannelOpenOk(open_ok) => {
                if let Some(slot) = self.connection.channel(channel) {
                    slot.set_state(ChannelState::Open);
                }
                if let Delivery::Unsolicited(method) =
                    self.connection.rpc.deliver(channel, open_ok.into())
                {
                    self.on_unsolicited(channel, method);
                }
            }
            other => {
                if let Delivery::Unsolicited(method) = self.connection.rpc.deliver(channel, other) {
                    self.on_unsolicited(channel, method);
                }
            }
        }
        Ok(Running::Continue)
    }

    /// A method nobody waits for. A waiting caller on the channel gets an error, otherwise the method is
    /// dropped
    fn on_unsolicited(&mut self, channel: u16, method: Method) {
        if self.connection.rpc.is_waiting(channel) {
            self.connection
                .rpc
                .fail(channel, channel::Error::UnexpectedReply(method.name()));
        } else {
            Self::warn_unexpected(channel, method.name(), self.connection.local_state());
        }
    }

    #[inline]
    async fn on_control(&mut self, control: ConnectionControl) -> Result<Running, Error> {
        match control {
            ConnectionControl::Close(reason) => self.on_close_request(reason).await,
            ConnectionControl::OpenChannel { responder, reply } => {
                if !matches!(self.connection.local_state(), ConnectionState::Open) {
                    let _ = responder.send(Err(channel::Error::ConnectionClosed(None)));
                    return Ok(Running::Continue);
                }
                let (id, state) = match self.connection.allocate_channel() {
                    Ok(allocated) => allocated,
                    Err(err) => {
                        let _ = responder.send(Err(err));
                        return Ok(Running::Continue);
                    }
                };
                self.register(id, Waiter::new(channel_open_replies(), reply));
                self.send_method(id, channel_methods::Open::new()).await?;
                let _ = responder.send(Ok((id, state)));
                Ok(Running::Continue)
            }
            ConnectionControl::CloseChannel {
                channel,
                reason,
                reply,
            } => {
                let waiter = Waiter::new(channel_close_replies(), reply);
                let slot_state = match self.usable_channel(channel) {
                    Ok(state) => state,
                    Err(err) => {
                        waiter.resolve(Err(err));
                        return Ok(Running::Continue);
                    }
                };
                if let ChannelState::Closing = slot_state {
                    waiter.resolve(Err(channel::Error::IllegalState(slot_state)));
                    return Ok(Running::Continue);
                }

                // A pending request on the channel can no longer be answered
                self.connection
                    .rpc
                    .fail(channel, channel::Error::ChannelClosed(None));
                self.register(channel, waiter);
                if let Some(slot) = self.connection.channel(channel) {
                    slot.set_state(ChannelState::Closing);
                }
                let close = channel_methods::Close::from(reason);
                self.send_rpc(channel, close.into()).await
            }
            ConnectionControl::Rpc {
                channel,
                method,
                expected,
                reply,
            } => {
                let waiter = Waiter::new(expected, reply);
                match self.usable_channel(channel) {
                    Ok(ChannelState::Open) => {}
                    Ok(state) => {
                        waiter.resolve(Err(channel::Error::IllegalState(state)));
                        return Ok(Running::Continue);
                    }
                    Err(err) => {
                        waiter.resolve(Err(err));
                        return Ok(Running::Continue);
                    }
                }
                if self.register(channel, waiter) {
                    self.send_rpc(channel, method).await
                } else {
                    Ok(Running::Continue)
                }
            }
            ConnectionControl::CancelRpc { channel } => {
                self.connection.rpc.cancel(channel);
                Ok(Running::Continue)
            }
        }
    }

    /// State of a channel that requests may be sent on
    fn usable_channel(&self, channel: u16) -> Result<ChannelState, channel::Error> {
        if !matches!(self.connection.local_state(), ConnectionState::Open) {
            return Err(channel::Error::ConnectionClosed(None));
        }
        match self.connection.channel(channel) {
            Some(slot) => Ok(slot.state()),
            None => Err(channel::Error::ChannelClosed(None)),
        }
    }

    /// Returns false if another request is still waiting on the channel
    fn register(&mut self, channel: u16, waiter: Waiter) -> bool {
        match self.connection.rpc.register(channel, waiter) {
            Ok(()) => true,
            Err(waiter) => {
                waiter.resolve(Err(channel::Error::RpcInProgress(channel)));
                false
            }
        }
    }

    /// Sends a request whose waiter is registered. Encoding errors fail only that request
    async fn send_rpc(&mut self, channel: u16, method: Method) -> Result<Running, Error> {
        match self.send_method(channel, method).await {
            Ok(()) => Ok(Running::Continue),
            Err(Error::Frame(frames::Error::Encode(err))) => {
                self.connection.rpc.fail(channel, err.into());
                Ok(Running::Continue)
            }
            Err(Error::Frame(frames::Error::MaxFrameSizeExceeded { size, .. })) => {
                self.connection
                    .rpc
                    .fail(channel, EncodeError::TooLong(size).into());
                Ok(Running::Continue)
            }
            Err(err) => Err(err),
        }
    }

    async fn on_close_request(&mut self, reason: CloseReason) -> Result<Running, Error> {
        match self.connection.local_state() {
            ConnectionState::Open => {
                self.connection.set_local_state(ConnectionState::Closing);
                let close = connection_methods::Close::from(reason);
                self.send_method(CONNECTION_CHANNEL, close).await?;
                Ok(Running::Continue)
            }
            // Close is already in progress
            ConnectionState::Closing => Ok(Running::Continue),
            ConnectionState::Closed => Ok(Running::Stop),
            ConnectionState::Unstarted | ConnectionState::Opening => {
                Err(Error::IllegalState(self.connection.local_state()))
            }
        }
    }

    #[inline]
    async fn on_heartbeat(&mut self) -> Result<Running, Error> {
        if self.heartbeat.is_expired(self.last_received) {
            return Err(Error::MissedHeartbeats);
        }
        match self.connection.local_state() {
            ConnectionState::Open | ConnectionState::Closing => {
                self.send_frame(Frame::heartbeat()).await?;
                Ok(Running::Continue)
            }
            ConnectionState::Closed => Ok(Running::Stop),
            ConnectionState::Unstarted | ConnectionState::Opening => Ok(Running::Continue),
        }
    }

    fn on_transport_closed(&mut self) -> Result<Running, Error> {
        match self.connection.local_state() {
            ConnectionState::Closed => Ok(Running::Stop),
            _ => Err(Error::ConnectionClosed(None)),
        }
    }

    async fn on_exit(&mut self) {
        if !self.connection.local_state().is_closed() {
            self.connection.on_closed();
        }
        let _ = self.transport.shutdown().await;
    }

    async fn event_loop(mut self) -> Result<(), Error> {
        let mut outcome = Ok(());
        loop {
            let result = tokio::select! {
                _ = self.heartbeat.next() => self.on_heartbeat().await,
                incoming = self.transport.next() => {
                    match incoming {
                        Some(incoming) => self.on_incoming(incoming).await,
                        None => self.on_transport_closed(),
                    }
                },
                control = self.control.recv(), if !self.control_closed => {
                    match control {
                        Some(control) => self.on_control(control).await,
                        None => {
                            // All handles are dropped
                            self.control_closed = true;
                            self.on_close_request(CloseReason::default()).await
                        }
                    }
                },
            };

            match result {
                Ok(Running::Continue) => {}
                Ok(Running::Stop) => break,
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(error = ?err, "connection event loop stopped");
                    #[cfg(feature = "log")]
                    log::error!("connection event loop stopped: {:?}", err);
                    outcome = Err(err);
                    break;
                }
            }
        }

        self.on_exit().await;

        #[cfg(feature = "tracing")]
        tracing::debug!("ConnectionEngine exiting event_loop");
        #[cfg(feature = "log")]
        log::debug!("ConnectionEngine exiting event_loop");

        match (outcome, self.connection.remote_close.take()) {
            (Ok(()), Some(reason)) if !reason.is_success() => Err(Error::Remote(reason)),
            (outcome, _) => outcome,
        }
    }

    fn warn_unknown_channel(channel: u16, what: &str) {
        #[cfg(feature = "tracing")]
        tracing::warn!(channel, what, "dropping frame for unknown channel");
        #[cfg(feature = "log")]
        log::warn!("dropping {} for unknown channel {}", what, channel);
        let _ = (channel, what);
    }

    fn warn_unexpected(channel: u16, method: &str, state: ConnectionState) {
        #[cfg(feature = "tracing")]
        tracing::warn!(channel, method, ?state, "dropping unexpected method");
        #[cfg(feature = "log")]
        log::warn!(
            "dropping unexpected method {} on channel {} in state {:?}",
            method,
            channel,
            state
        );
        let _ = (channel, method, state);
    }
}
