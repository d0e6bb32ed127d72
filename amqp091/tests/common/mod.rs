#![allow(dead_code)]

use amqp091::{
    frames::{Frame, FrameBody, FrameCodec},
    types::{
        methods::{channel, connection, Method},
        primitives::FieldTable,
    },
    Builder, Connection, ConnectionHandle,
};
use futures_util::{SinkExt, StreamExt};
use testcontainers::{
    clients::Cli,
    core::WaitFor,
    Container, GenericImage,
};
use tokio::{
    io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream},
    sync::OnceCell,
};
use tokio_util::codec::Framed;

pub const PROTOCOL_HEADER: [u8; 8] = *b"AMQP\x00\x00\x09\x01";

static DOCKER: OnceCell<Cli> = OnceCell::const_new();

pub async fn setup_rabbitmq(
    username: &str,
    password: &str,
) -> (Container<'static, GenericImage>, u16) {
    let docker = DOCKER.get_or_init(|| async { Cli::default() }).await;
    let image = GenericImage::new("docker.io/library/rabbitmq", "3-management")
        .with_env_var("RABBITMQ_DEFAULT_USER", username)
        .with_env_var("RABBITMQ_DEFAULT_PASS", password)
        .with_exposed_port(5672)
        .with_wait_for(WaitFor::message_on_stdout("Server startup complete"));
    let node = docker.run(image);
    let port = node.get_host_port_ipv4(5672);
    (node, port)
}

/// Builder with the credentials expected by the scripted server and heartbeats off
pub fn builder() -> Builder {
    Connection::builder()
        .user("foo")
        .password("bar")
        .vhost("baz")
        .heartbeat(0)
}

pub fn start() -> connection::Start {
    connection::Start {
        version_major: 0,
        version_minor: 9,
        server_properties: FieldTable::new().with("product", "scripted"),
        mechanisms: "AMQPLAIN PLAIN".into(),
        locales: "en_US".into(),
    }
}

pub fn tune(channel_max: u16, frame_max: u32, heartbeat: u16) -> connection::Tune {
    connection::Tune {
        channel_max,
        frame_max,
        heartbeat,
    }
}

pub fn open_ok() -> connection::OpenOk {
    connection::OpenOk {
        known_hosts: Default::default(),
    }
}

pub fn channel_open_ok() -> channel::OpenOk {
    channel::OpenOk {
        channel_id: Default::default(),
    }
}

/// Server side of an in-memory connection, driven step by step by a test
pub struct ScriptedServer {
    framed: Framed<DuplexStream, FrameCodec>,
}

impl ScriptedServer {
    pub async fn accept(mut io: DuplexStream) -> Self {
        let mut header = [0u8; 8];
        io.read_exact(&mut header).await.unwrap();
        assert_eq!(header, PROTOCOL_HEADER);
        Self {
            framed: Framed::new(io, FrameCodec::new(usize::MAX)),
        }
    }

    pub async fn send(&mut self, channel: u16, method: impl Into<Method>) {
        self.send_frame(Frame::method(channel, method)).await
    }

    pub async fn send_frame(&mut self, frame: Frame) {
        self.framed.send(frame).await.unwrap()
    }

    /// Writes bytes as they are, bypassing the codec
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.framed.get_mut().write_all(bytes).await.unwrap();
        self.framed.get_mut().flush().await.unwrap();
    }

    /// Next frame, heartbeats included
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.framed.next().await.and_then(Result::ok)
    }

    /// Next frame other than a heartbeat. `None` once the client has gone away
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match self.framed.next().await {
                Some(Ok(frame)) if matches!(frame.body, FrameBody::Heartbeat) => continue,
                Some(Ok(frame)) => return Some(frame),
                Some(Err(_)) | None => return None,
            }
        }
    }

    /// Next method, which must travel on `channel`
    pub async fn expect(&mut self, channel: u16) -> Method {
        let frame = self.recv().await.expect("client went away");
        assert_eq!(frame.channel, channel, "unexpected channel for {:?}", frame.body);
        match frame.body {
            FrameBody::Method(method) => method,
            body => panic!("expected a method, found {:?}", body),
        }
    }

    /// Answers the client side of the handshake up to `connection.open-ok`
    pub async fn handshake(&mut self, tune: connection::Tune) {
        self.send(0, start()).await;
        match self.expect(0).await {
            Method::ConnectionStartOk(start_ok) => {
                assert_eq!(start_ok.mechanism.as_str(), "PLAIN");
                assert_eq!(start_ok.response.as_bytes(), b"\x00foo\x00bar");
            }
            other => panic!("expected connection.start-ok, found {:?}", other),
        }
        self.send(0, tune).await;
        assert!(matches!(self.expect(0).await, Method::ConnectionTuneOk(_)));
        match self.expect(0).await {
            Method::ConnectionOpen(open) => assert_eq!(open.virtual_host.as_str(), "baz"),
            other => panic!("expected connection.open, found {:?}", other),
        }
        self.send(0, open_ok()).await;
    }

    /// Accepts the next `channel.open` and returns its channel number
    pub async fn accept_channel(&mut self) -> u16 {
        let frame = self.recv().await.expect("client went away");
        match frame.body {
            FrameBody::Method(Method::ChannelOpen(_)) => {}
            body => panic!("expected channel.open, found {:?}", body),
        }
        self.send(frame.channel, channel_open_ok()).await;
        frame.channel
    }

    /// Whether the client has closed its end
    pub async fn is_eof(&mut self) -> bool {
        self.recv().await.is_none()
    }
}

pub async fn connect_with(
    builder: Builder,
    tune: connection::Tune,
) -> (ConnectionHandle, ScriptedServer) {
    let (client, server) = duplex(64 * 1024);
    let (connection, server) = tokio::join!(builder.start(client), async move {
        let mut server = ScriptedServer::accept(server).await;
        server.handshake(tune).await;
        server
    });
    (connection.unwrap(), server)
}

pub async fn connect() -> (ConnectionHandle, ScriptedServer) {
    connect_with(builder(), tune(2047, 131_072, 0)).await
}
