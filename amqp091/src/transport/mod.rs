//! Implements low level transport framing
//!
//! The protocol header is written to the raw stream before the stream is bound into a [`Transport`].
//! After that every read and write goes through [`FrameCodec`].

pub mod protocol_header;

use std::{io, pin::Pin, task::Poll};

use futures_util::{Sink, SinkExt, Stream};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;

use crate::frames::{Error, Frame, FrameCodec};

use protocol_header::ProtocolHeader;

pin_project! {
    /// Frame-level view over a byte stream
    ///
    /// Reports itself as connected until the stream reaches EOF or the sink is closed.
    pub struct Transport<Io> {
        #[pin]
        framed: Framed<Io, FrameCodec>,
        connected: bool,
    }
}

impl<Io> std::fmt::Debug for Transport<Io> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("codec", self.framed.codec())
            .field("connected", &self.connected)
            .finish()
    }
}

impl<Io> Transport<Io>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    /// Binds a stream whose protocol header has already been sent
    pub fn bind(io: Io, max_frame_size: usize) -> Self {
        let framed = Framed::new(io, FrameCodec::new(max_frame_size));
        Self {
            framed,
            connected: true,
        }
    }

    /// Writes the protocol header to the raw stream
    pub async fn send_proto_header(io: &mut Io, proto_header: ProtocolHeader) -> io::Result<()> {
        let buf: [u8; 8] = proto_header.into();
        io.write_all(&buf).await?;
        io.flush().await
    }

    /// Changes the max total frame size accepted and produced by the codec
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) -> &mut Self {
        self.framed.codec_mut().set_max_frame_size(max_frame_size);
        self
    }

    /// Max total frame size
    pub fn max_frame_size(&self) -> usize {
        self.framed.codec().max_frame_size()
    }

    /// Whether the underlying stream is still usable
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Flushes pending frames and shuts the write half down
    pub async fn shutdown(&mut self) -> Result<(), Error> {
        if !self.connected {
            return Ok(());
        }
        let result = SinkExt::<Frame>::close(self).await;
        self.connected = false;
        result
    }
}

impl<Io> Sink<Frame> for Transport<Io>
where
    Io: AsyncWrite + Unpin,
{
    type Error = Error;

    fn poll_ready(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        this.framed.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        let this = self.project();
        this.framed.start_send(item)
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        this.framed.poll_flush(cx)
    }

    fn poll_close(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        let poll = this.framed.poll_close(cx);
        if poll.is_ready() {
            *this.connected = false;
        }
        poll
    }
}

impl<Io> Stream for Transport<Io>
where
    Io: AsyncRead + Unpin,
{
    type Item = Result<Frame, Error>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.framed.poll_next(cx) {
            Poll::Ready(None) => {
                *this.connected = false;
                Poll::Ready(None)
            }
            poll => poll,
        }
    }
}
