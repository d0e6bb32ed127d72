//! Protocol constants, reply codes and close reasons

mod close_reason;
mod reply_code;

pub use close_reason::*;
pub use reply_code::*;

/// the IANA assigned port number for AMQP.
pub const PORT: u16 = 5672;

/// the IANA assigned port number for secure AMQP (amqps).
pub const SECURE_PORT: u16 = 5671;

/// major protocol version.
pub const MAJOR: u8 = 0;

/// minor protocol version.
pub const MINOR: u8 = 9;

/// protocol revision.
pub const REVISION: u8 = 1;

/// Frame type of a method frame
pub const FRAME_METHOD: u8 = 1;

/// Frame type of a content header frame
pub const FRAME_HEADER: u8 = 2;

/// Frame type of a content body frame
pub const FRAME_BODY: u8 = 3;

/// Frame type of a heartbeat frame
pub const FRAME_HEARTBEAT: u8 = 8;

/// The octet that terminates every frame
pub const FRAME_END: u8 = 0xCE;

/// Size of the frame header: type (1), channel (2) and payload size (4)
pub const FRAME_HEADER_SIZE: usize = 7;

/// Total overhead of a frame: header plus the frame-end octet
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + 1;

/// the lower bound for the agreed maximum frame size (in bytes).
///
/// Peers can send frames of up to this size before a frame-max has been negotiated.
pub const FRAME_MIN_SIZE: u32 = 4096;

/// The channel number reserved for connection-level methods
pub const CONNECTION_CHANNEL: u16 = 0;
