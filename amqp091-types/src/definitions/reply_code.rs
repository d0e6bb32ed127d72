use std::fmt;

/// Reply codes carried by `connection.close` and `channel.close`
///
/// Soft errors close only the channel; hard errors close the whole connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ReplyCode {
    /// Indicates that the method completed successfully.
    ReplySuccess = 200,
    /// The client attempted to transfer content larger than the server could accept.
    ContentTooLarge = 311,
    /// Returned when a mandatory message cannot be routed.
    NoRoute = 312,
    /// Returned when an immediate message has no consumer.
    NoConsumers = 313,
    /// An operator intervened to close the connection.
    ConnectionForced = 320,
    /// The client tried to work with an unknown virtual host.
    InvalidPath = 402,
    /// The client attempted to work with a server entity to which it has no access.
    AccessRefused = 403,
    /// The client attempted to work with a server entity that does not exist.
    NotFound = 404,
    /// The client attempted to work with an entity locked by another client.
    ResourceLocked = 405,
    /// The client requested a method that was not allowed because some precondition failed.
    PreconditionFailed = 406,
    /// The sender sent a malformed frame.
    FrameError = 501,
    /// The sender sent a frame that contained illegal values for one or more fields.
    SyntaxError = 502,
    /// The client sent an invalid sequence of frames.
    CommandInvalid = 503,
    /// The client attempted to work with a channel that had not been correctly opened.
    ChannelError = 504,
    /// The peer sent a frame that was not expected.
    UnexpectedFrame = 505,
    /// The server could not complete the method because it lacked sufficient resources.
    ResourceError = 506,
    /// The client tried to work with some entity in a manner that is prohibited.
    NotAllowed = 530,
    /// The client tried to use functionality that is not implemented.
    NotImplemented = 540,
    /// The server could not complete the method because of an internal error.
    InternalError = 541,
}

impl ReplyCode {
    /// The numeric code
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Whether the code is a connection-level (hard) error
    pub fn is_hard_error(&self) -> bool {
        matches!(
            self,
            ReplyCode::ConnectionForced
                | ReplyCode::InvalidPath
                | ReplyCode::FrameError
                | ReplyCode::SyntaxError
                | ReplyCode::CommandInvalid
                | ReplyCode::ChannelError
                | ReplyCode::UnexpectedFrame
                | ReplyCode::ResourceError
                | ReplyCode::NotAllowed
                | ReplyCode::NotImplemented
                | ReplyCode::InternalError
        )
    }

    /// Name of the constant in the protocol definition
    pub fn name(&self) -> &'static str {
        match self {
            ReplyCode::ReplySuccess => "REPLY_SUCCESS",
            ReplyCode::ContentTooLarge => "CONTENT_TOO_LARGE",
            ReplyCode::NoRoute => "NO_ROUTE",
            ReplyCode::NoConsumers => "NO_CONSUMERS",
            ReplyCode::ConnectionForced => "CONNECTION_FORCED",
            ReplyCode::InvalidPath => "INVALID_PATH",
            ReplyCode::AccessRefused => "ACCESS_REFUSED",
            ReplyCode::NotFound => "NOT_FOUND",
            ReplyCode::ResourceLocked => "RESOURCE_LOCKED",
            ReplyCode::PreconditionFailed => "PRECONDITION_FAILED",
            ReplyCode::FrameError => "FRAME_ERROR",
            ReplyCode::SyntaxError => "SYNTAX_ERROR",
            ReplyCode::CommandInvalid => "COMMAND_INVALID",
            ReplyCode::ChannelError => "CHANNEL_ERROR",
            ReplyCode::UnexpectedFrame => "UNEXPECTED_FRAME",
            ReplyCode::ResourceError => "RESOURCE_ERROR",
            ReplyCode::NotAllowed => "NOT_ALLOWED",
            ReplyCode::NotImplemented => "NOT_IMPLEMENTED",
            ReplyCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.name())
    }
}

impl From<ReplyCode> for u16 {
    fn from(value: ReplyCode) -> Self {
        value.code()
    }
}

impl TryFrom<u16> for ReplyCode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let code = match value {
            200 => ReplyCode::ReplySuccess,
            311 => ReplyCode::ContentTooLarge,
            312 => ReplyCode::NoRoute,
            313 => ReplyCode::NoConsumers,
            320 => ReplyCode::ConnectionForced,
            402 => ReplyCode::InvalidPath,
            403 => ReplyCode::AccessRefused,
            404 => ReplyCode::NotFound,
            405 => ReplyCode::ResourceLocked,
            406 => ReplyCode::PreconditionFailed,
            501 => ReplyCode::FrameError,
            502 => ReplyCode::SyntaxError,
            503 => ReplyCode::CommandInvalid,
            504 => ReplyCode::ChannelError,
            505 => ReplyCode::UnexpectedFrame,
            506 => ReplyCode::ResourceError,
            530 => ReplyCode::NotAllowed,
            540 => ReplyCode::NotImplemented,
            541 => ReplyCode::InternalError,
            other => return Err(other),
        };
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::ReplyCode;

    #[test]
    fn codes_round_trip_through_u16() {
        for code in [200u16, 320, 403, 404, 406, 501, 504, 540] {
            let reply = ReplyCode::try_from(code).unwrap();
            assert_eq!(u16::from(reply), code);
        }
        assert_eq!(ReplyCode::try_from(999), Err(999));
    }

    #[test]
    fn soft_and_hard_errors() {
        assert!(!ReplyCode::ReplySuccess.is_hard_error());
        assert!(!ReplyCode::PreconditionFailed.is_hard_error());
        assert!(ReplyCode::FrameError.is_hard_error());
        assert!(ReplyCode::ConnectionForced.is_hard_error());
    }
}
