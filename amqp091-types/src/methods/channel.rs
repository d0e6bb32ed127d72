//! Methods of the `channel` class (class id 20)

use crate::{
    definitions::CloseReason,
    primitives::{LongStr, ShortStr},
};

method! {
    /// Open a channel for use.
    ///
    /// <method name="open" synchronous="1" index="10">
    ///     <response name="open-ok"/>
    /// </method>
    pub struct Open (20, 10, "channel.open") {
        /// <field name="reserved-1" type="shortstr" reserved="1"/>
        pub out_of_band: ShortStr,
    }
}

impl Open {
    /// Channel.Open with the reserved field zeroed
    pub fn new() -> Self {
        Self {
            out_of_band: ShortStr::empty(),
        }
    }
}

impl Default for Open {
    fn default() -> Self {
        Self::new()
    }
}

method! {
    /// Signal that the channel is ready.
    pub struct OpenOk (20, 11, "channel.open-ok") {
        /// <field name="reserved-1" type="longstr" reserved="1"/>
        pub channel_id: LongStr,
    }
}

method! {
    /// Enable/disable flow from peer.
    pub struct Flow (20, 20, "channel.flow") {
        /// <field name="active" domain="bit"/>
        pub active: bool,
    }
}

method! {
    /// Confirm a flow method.
    pub struct FlowOk (20, 21, "channel.flow-ok") {
        /// <field name="active" domain="bit"/>
        pub active: bool,
    }
}

method! {
    /// Request a channel close.
    pub struct Close (20, 40, "channel.close") {
        /// <field name="reply-code" domain="reply-code"/>
        pub reply_code: u16,

        /// <field name="reply-text" domain="reply-text"/>
        pub reply_text: ShortStr,

        /// <field name="class-id" domain="class-id"/>
        pub class_id: u16,

        /// <field name="method-id" domain="method-id"/>
        pub method_id: u16,
    }
}

impl Close {
    /// A close that is not caused by a specific method
    pub fn new(reply_code: impl Into<u16>, reply_text: impl Into<ShortStr>) -> Self {
        CloseReason::new(reply_code, reply_text).into()
    }

    /// Extract the close reason
    pub fn reason(&self) -> CloseReason {
        CloseReason {
            reply_code: self.reply_code,
            reply_text: self.reply_text.clone(),
            class_id: self.class_id,
            method_id: self.method_id,
        }
    }
}

impl From<CloseReason> for Close {
    fn from(reason: CloseReason) -> Self {
        Self {
            reply_code: reason.reply_code,
            reply_text: reason.reply_text,
            class_id: reason.class_id,
            method_id: reason.method_id,
        }
    }
}

method! {
    /// Confirm a channel close.
    pub struct CloseOk (20, 41, "channel.close-ok") {}
}
