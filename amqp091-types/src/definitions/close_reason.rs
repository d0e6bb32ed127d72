use std::fmt;

use crate::primitives::ShortStr;

use super::ReplyCode;

/// Why a connection or channel was closed
///
/// Carries the arguments shared by `connection.close` and `channel.close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Reply code, see [`ReplyCode`]
    pub reply_code: u16,

    /// Localised reply text
    pub reply_text: ShortStr,

    /// Class id of the method that caused the close, 0 if none
    pub class_id: u16,

    /// Method id of the method that caused the close, 0 if none
    pub method_id: u16,
}

impl CloseReason {
    /// Creates a close reason that is not caused by a specific method
    pub fn new(reply_code: impl Into<u16>, reply_text: impl Into<ShortStr>) -> Self {
        Self {
            reply_code: reply_code.into(),
            reply_text: reply_text.into(),
            class_id: 0,
            method_id: 0,
        }
    }

    /// The reply code if it is a known one
    pub fn code(&self) -> Option<ReplyCode> {
        ReplyCode::try_from(self.reply_code).ok()
    }

    /// Whether this reason denotes a normal shutdown
    pub fn is_success(&self) -> bool {
        self.reply_code == ReplyCode::ReplySuccess.code()
    }
}

impl Default for CloseReason {
    fn default() -> Self {
        Self::new(ReplyCode::ReplySuccess, "Goodbye")
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.reply_code, self.reply_text)?;
        if self.class_id != 0 || self.method_id != 0 {
            write!(f, " (caused by {}.{})", self.class_id, self.method_id)?;
        }
        Ok(())
    }
}
