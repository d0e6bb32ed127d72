//! AMQP 0-9-1 frame type and corresponding encoder and decoder
//!
//! ```text
//! +------+---------+---------+-------------+-----------+
//! | type | channel | size    | payload     | frame-end |
//! | u8   | u16 BE  | u32 BE  | size octets | 0xCE      |
//! +------+---------+---------+-------------+-----------+
//! ```

use amqp091_types::{
    definitions::{
        FRAME_BODY, FRAME_END, FRAME_HEADER, FRAME_HEADER_SIZE, FRAME_HEARTBEAT, FRAME_METHOD,
        FRAME_OVERHEAD,
    },
    methods::Method,
    EncodeError,
};
use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

mod error;
pub use error::Error;

const PROTOCOL_HEADER_PREFIX: &[u8; 4] = b"AMQP";

/// AMQP frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Channel number of the frame
    pub channel: u16,

    /// Frame body
    pub body: FrameBody,
}

/// Body of a frame, tagged by the frame type
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    /// A method frame
    Method(Method),

    /// A content header frame. Content is not interpreted by this crate
    Header(Bytes),

    /// A content body frame. Content is not interpreted by this crate
    Body(Bytes),

    /// A heartbeat frame
    Heartbeat,
}

impl FrameBody {
    /// Frame type octet
    pub fn frame_type(&self) -> u8 {
        match self {
            FrameBody::Method(_) => FRAME_METHOD,
            FrameBody::Header(_) => FRAME_HEADER,
            FrameBody::Body(_) => FRAME_BODY,
            FrameBody::Heartbeat => FRAME_HEARTBEAT,
        }
    }
}

impl Frame {
    /// Creates a new frame
    pub fn new(channel: impl Into<u16>, body: FrameBody) -> Self {
        Self {
            channel: channel.into(),
            body,
        }
    }

    /// Creates a method frame
    pub fn method(channel: u16, method: impl Into<Method>) -> Self {
        Self {
            channel,
            body: FrameBody::Method(method.into()),
        }
    }

    /// Creates a heartbeat frame, which always travels on channel 0
    pub fn heartbeat() -> Self {
        Self {
            channel: 0,
            body: FrameBody::Heartbeat,
        }
    }

    /// Get the channel of the frame
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Get the body of the frame
    pub fn body(&self) -> &FrameBody {
        &self.body
    }

    /// Consume the frame to get the frame body
    pub fn into_body(self) -> FrameBody {
        self.body
    }
}

/// Encoder and decoder of AMQP frames
///
/// `max_frame_size` bounds the total size of a frame, header and frame-end included.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Creates a codec that accepts frames of at most `max_frame_size` bytes
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Max total frame size
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Changes the max total frame size, typically after tuning
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        let result = write_frame(&item, dst).and_then(|size| {
            if size > self.max_frame_size {
                Err(Error::MaxFrameSizeExceeded {
                    size,
                    max: self.max_frame_size,
                })
            } else {
                Ok(())
            }
        });
        if result.is_err() {
            // Never leave a partial frame in the write buffer
            dst.truncate(start);
        }
        result
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        if src[0] == PROTOCOL_HEADER_PREFIX[0] {
            return decode_protocol_header(src);
        }

        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let frame_type = src[0];
        check_frame_type(frame_type)?;
        let size = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;
        let total = size.saturating_add(FRAME_OVERHEAD);
        if total > self.max_frame_size {
            return Err(Error::MaxFrameSizeExceeded {
                size: total,
                max: self.max_frame_size,
            });
        }

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total).freeze();
        parse_frame(frame).map(Some)
    }
}

/// Encodes a method into a complete method frame on the given channel
pub fn encode(method: &Method, channel: u16) -> Result<Bytes, Error> {
    let mut dst = BytesMut::new();
    let frame = Frame::method(channel, method.clone());
    write_frame(&frame, &mut dst)?;
    Ok(dst.freeze())
}

/// Decodes exactly one complete frame
///
/// The declared payload size must account for every byte of `src`.
pub fn decode(src: &[u8]) -> Result<Frame, Error> {
    if src.len() < FRAME_OVERHEAD {
        return Err(Error::MalformedFrame(format!(
            "frame of {} bytes is shorter than the frame overhead",
            src.len()
        )));
    }
    check_frame_type(src[0])?;
    let size = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;
    if size.saturating_add(FRAME_OVERHEAD) != src.len() {
        return Err(Error::MalformedFrame(format!(
            "declared payload size {} does not match the {} bytes available",
            size,
            src.len() - FRAME_OVERHEAD
        )));
    }
    parse_frame(Bytes::copy_from_slice(src))
}

/// Writes one frame and returns its total size
fn write_frame(frame: &Frame, dst: &mut BytesMut) -> Result<usize, Error> {
    let start = dst.len();
    dst.put_u8(frame.body.frame_type());
    dst.put_u16(frame.channel);
    dst.put_u32(0); // size placeholder

    let payload_start = dst.len();
    match &frame.body {
        FrameBody::Method(method) => method.encode(dst)?,
        FrameBody::Header(payload) | FrameBody::Body(payload) => dst.put_slice(payload),
        FrameBody::Heartbeat => {}
    }

    let size = dst.len() - payload_start;
    let declared = u32::try_from(size).map_err(|_| EncodeError::TooLong(size))?;
    dst[start + 3..payload_start].copy_from_slice(&declared.to_be_bytes());
    dst.put_u8(FRAME_END);
    Ok(dst.len() - start)
}

fn check_frame_type(frame_type: u8) -> Result<(), Error> {
    match frame_type {
        FRAME_METHOD | FRAME_HEADER | FRAME_BODY | FRAME_HEARTBEAT => Ok(()),
        other => Err(Error::MalformedFrame(format!(
            "unknown frame type {}",
            other
        ))),
    }
}

/// `frame` holds exactly one frame whose size field has been checked
fn parse_frame(frame: Bytes) -> Result<Frame, Error> {
    let total = frame.len();
    if frame[total - 1] != FRAME_END {
        return Err(Error::MalformedFrame(format!(
            "expected frame-end 0xCE, found {:#04x}",
            frame[total - 1]
        )));
    }

    let frame_type = frame[0];
    let channel = u16::from_be_bytes([frame[1], frame[2]]);
    let mut payload = frame.slice(FRAME_HEADER_SIZE..total - 1);

    let body = match frame_type {
        FRAME_METHOD => FrameBody::Method(Method::decode(&mut payload)?),
        FRAME_HEADER => FrameBody::Header(payload),
        FRAME_BODY => FrameBody::Body(payload),
        FRAME_HEARTBEAT => {
            if !payload.is_empty() {
                return Err(Error::MalformedFrame(format!(
                    "heartbeat frame carries {} bytes of payload",
                    payload.len()
                )));
            }
            FrameBody::Heartbeat
        }
        other => {
            return Err(Error::MalformedFrame(format!(
                "unknown frame type {}",
                other
            )))
        }
    };

    Ok(Frame { channel, body })
}

fn decode_protocol_header(src: &mut BytesMut) -> Result<Option<Frame>, Error> {
    let n = src.len().min(PROTOCOL_HEADER_PREFIX.len());
    if src[..n] != PROTOCOL_HEADER_PREFIX[..n] {
        return Err(Error::MalformedFrame(format!(
            "unknown frame type {}",
            src[0]
        )));
    }
    if src.len() < 8 {
        return Ok(None);
    }
    let mut header = [0u8; 8];
    header.copy_from_slice(&src.split_to(8));
    Err(Error::ProtocolHeaderMismatch(header))
}

#[cfg(test)]
mod tests {
    use amqp091_types::methods::{channel, connection, Method};
    use bytes::{BufMut, BytesMut};
    use tokio_util::codec::{Decoder, Encoder};

    use super::{decode, encode, Error, Frame, FrameBody, FrameCodec};

    const CHANNEL_OPEN_ON_1: &[u8] = &[
        0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x05, // method frame, channel 1, size 5
        0x00, 0x14, 0x00, 0x0a, 0x00, // channel.open
        0xce,
    ];

    #[test]
    fn encode_method_frame() {
        let bytes = encode(&Method::from(channel::Open::new()), 1).unwrap();
        assert_eq!(&bytes[..], CHANNEL_OPEN_ON_1);
    }

    #[test]
    fn encode_heartbeat_frame() {
        let mut codec = FrameCodec::default();
        let mut dst = BytesMut::new();
        codec.encode(Frame::heartbeat(), &mut dst).unwrap();
        assert_eq!(&dst[..], &[0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xce]);
    }

    #[test]
    fn decode_method_frame() {
        let frame = decode(CHANNEL_OPEN_ON_1).unwrap();
        assert_eq!(frame, Frame::method(1, channel::Open::new()));
    }

    #[test]
    fn size_mismatch_is_malformed() {
        // Declared size 6 while only 5 bytes of payload follow
        let mut bytes = CHANNEL_OPEN_ON_1.to_vec();
        bytes[6] = 0x06;
        assert!(matches!(decode(&bytes), Err(Error::MalformedFrame(_))));

        // Declared size 4 while 5 bytes of payload follow
        bytes[6] = 0x04;
        assert!(matches!(decode(&bytes), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn missing_frame_end_is_malformed() {
        let mut bytes = CHANNEL_OPEN_ON_1.to_vec();
        let last = bytes.len() - 1;
        bytes[last] = 0x00;
        assert!(matches!(decode(&bytes), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn unknown_frame_type_is_malformed() {
        let mut bytes = CHANNEL_OPEN_ON_1.to_vec();
        bytes[0] = 0x05;
        assert!(matches!(decode(&bytes), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn heartbeat_with_payload_is_malformed() {
        let bytes = [0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xff, 0xce];
        assert!(matches!(decode(&bytes), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn unknown_method_is_reported() {
        let bytes = [
            0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x00, 0x3c, 0x00, 0x28, 0xce,
        ];
        assert!(matches!(
            decode(&bytes),
            Err(Error::UnknownMethod {
                class_id: 60,
                method_id: 40
            })
        ));
    }

    #[test]
    fn deeply_nested_server_properties_are_malformed() {
        let mut arrays = BytesMut::new();
        for level in (1..=25_000u32).rev() {
            arrays.put_u32(level * 5);
            arrays.put_u8(b'A');
        }
        arrays.put_u32(0);

        let mut payload = BytesMut::new();
        payload.put_slice(&[0x00, 0x0a, 0x00, 0x0a, 0x00, 0x09]); // connection.start 0-9
        payload.put_u32(3 + arrays.len() as u32);
        payload.put_slice(&[1, b'k', b'A']);
        payload.put_slice(&arrays);
        payload.put_u32(0); // mechanisms
        payload.put_u32(0); // locales

        let mut bytes = BytesMut::new();
        bytes.put_slice(&[0x01, 0x00, 0x00]);
        bytes.put_u32(payload.len() as u32);
        bytes.put_slice(&payload);
        bytes.put_u8(0xce);

        assert!(bytes.len() < 131_072);
        assert!(matches!(decode(&bytes), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn content_frames_are_passed_through() {
        let bytes = [0x03, 0x00, 0x02, 0x00, 0x00, 0x00, 0x02, b'h', b'i', 0xce];
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.channel(), 2);
        assert_eq!(frame.into_body(), FrameBody::Body(bytes::Bytes::from_static(b"hi")));
    }

    #[test]
    fn stream_decoder_waits_for_complete_frames() {
        let mut codec = FrameCodec::default();
        let mut src = BytesMut::new();

        src.put_slice(&CHANNEL_OPEN_ON_1[..5]);
        assert!(codec.decode(&mut src).unwrap().is_none());

        src.put_slice(&CHANNEL_OPEN_ON_1[5..]);
        src.put_slice(&CHANNEL_OPEN_ON_1[..3]);
        let frame = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(frame, Frame::method(1, channel::Open::new()));

        // The start of the next frame stays in the buffer
        assert_eq!(src.len(), 3);
        assert!(codec.decode(&mut src).unwrap().is_none());
    }

    #[test]
    fn stream_decoder_enforces_max_frame_size() {
        let mut codec = FrameCodec::new(12);
        let mut src = BytesMut::from(CHANNEL_OPEN_ON_1);
        assert!(matches!(
            codec.decode(&mut src),
            Err(Error::MaxFrameSizeExceeded { size: 13, max: 12 })
        ));
    }

    #[test]
    fn encoder_enforces_max_frame_size() {
        let mut codec = FrameCodec::new(12);
        let mut dst = BytesMut::new();
        let result = codec.encode(Frame::method(1, channel::Open::new()), &mut dst);
        assert!(matches!(result, Err(Error::MaxFrameSizeExceeded { .. })));
        assert!(dst.is_empty());
    }

    #[test]
    fn server_protocol_header_is_detected() {
        let mut codec = FrameCodec::default();
        let mut src = BytesMut::from(&b"AMQP"[..]);
        assert!(codec.decode(&mut src).unwrap().is_none());

        src.put_slice(&[0x00, 0x00, 0x09, 0x01]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(Error::ProtocolHeaderMismatch(header)) if &header == b"AMQP\x00\x00\x09\x01"
        ));
    }

    #[test]
    fn connection_close_frame() {
        let bytes = encode(&connection::Close::new(200u16, "Goodbye").into(), 0).unwrap();
        assert_eq!(&bytes[..7], &[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x12]);
        assert_eq!(decode(&bytes).unwrap().channel(), 0);
    }
}
