//! Methods of the `connection` class (class id 10)
//!
//! All of them travel on channel 0.

use crate::{
    definitions::CloseReason,
    primitives::{FieldTable, LongStr, ShortStr},
};

method! {
    /// Start connection negotiation.
    ///
    /// <method name="start" synchronous="1" index="10">
    ///     <chassis name="client" implement="MUST"/>
    ///     <response name="start-ok"/>
    /// </method>
    pub struct Start (10, 10, "connection.start") {
        /// <field name="version-major" domain="octet"/>
        pub version_major: u8,

        /// <field name="version-minor" domain="octet"/>
        pub version_minor: u8,

        /// <field name="server-properties" domain="peer-properties"/>
        pub server_properties: FieldTable,

        /// <field name="mechanisms" domain="longstr"/>
        pub mechanisms: LongStr,

        /// <field name="locales" domain="longstr"/>
        pub locales: LongStr,
    }
}

impl Start {
    /// SASL mechanisms offered by the server, separated by spaces on the wire
    pub fn mechanisms(&self) -> Vec<String> {
        self.mechanisms
            .to_string_lossy()
            .split_whitespace()
            .map(ToString::to_string)
            .collect()
    }

    /// Message locales offered by the server, separated by spaces on the wire
    pub fn locales(&self) -> Vec<String> {
        self.locales
            .to_string_lossy()
            .split_whitespace()
            .map(ToString::to_string)
            .collect()
    }
}

method! {
    /// Select security mechanism and locale.
    ///
    /// <method name="start-ok" synchronous="1" index="11">
    ///     <chassis name="server" implement="MUST"/>
    /// </method>
    pub struct StartOk (10, 11, "connection.start-ok") {
        /// <field name="client-properties" domain="peer-properties"/>
        pub client_properties: FieldTable,

        /// <field name="mechanism" domain="shortstr"/>
        pub mechanism: ShortStr,

        /// <field name="response" domain="longstr"/>
        pub response: LongStr,

        /// <field name="locale" domain="shortstr"/>
        pub locale: ShortStr,
    }
}

method! {
    /// Security mechanism challenge.
    ///
    /// <method name="secure" synchronous="1" index="20">
    ///     <response name="secure-ok"/>
    /// </method>
    pub struct Secure (10, 20, "connection.secure") {
        /// <field name="challenge" domain="longstr"/>
        pub challenge: LongStr,
    }
}

method! {
    /// Security mechanism response.
    pub struct SecureOk (10, 21, "connection.secure-ok") {
        /// <field name="response" domain="longstr"/>
        pub response: LongStr,
    }
}

method! {
    /// Propose connection tuning parameters.
    ///
    /// A value of zero means the server imposes no limit (`channel-max`, `frame-max`) or does not want
    /// heartbeats (`heartbeat`).
    pub struct Tune (10, 30, "connection.tune") {
        /// <field name="channel-max" domain="short"/>
        pub channel_max: u16,

        /// <field name="frame-max" domain="long"/>
        pub frame_max: u32,

        /// <field name="heartbeat" domain="short"/>
        pub heartbeat: u16,
    }
}

method! {
    /// Negotiate connection tuning parameters.
    pub struct TuneOk (10, 31, "connection.tune-ok") {
        /// <field name="channel-max" domain="short"/>
        pub channel_max: u16,

        /// <field name="frame-max" domain="long"/>
        pub frame_max: u32,

        /// <field name="heartbeat" domain="short"/>
        pub heartbeat: u16,
    }
}

method! {
    /// Open connection to virtual host.
    pub struct Open (10, 40, "connection.open") {
        /// <field name="virtual-host" domain="path"/>
        pub virtual_host: ShortStr,

        /// <field name="reserved-1" type="shortstr" reserved="1"/>
        pub capabilities: ShortStr,

        /// <field name="reserved-2" type="bit" reserved="1"/>
        pub insist: bool,
    }
}

impl Open {
    /// Opens the given virtual host with the reserved fields zeroed
    pub fn new(virtual_host: impl Into<ShortStr>) -> Self {
        Self {
            virtual_host: virtual_host.into(),
            capabilities: ShortStr::empty(),
            insist: false,
        }
    }
}

method! {
    /// Signal that connection is ready.
    pub struct OpenOk (10, 41, "connection.open-ok") {
        /// <field name="reserved-1" type="shortstr" reserved="1"/>
        pub known_hosts: ShortStr,
    }
}

method! {
    /// Request a connection close.
    ///
    /// This method indicates that the sender wants to close the connection. This may be due to internal
    /// conditions (e.g. a forced shut-down) or due to an error handling a specific method, i.e. an exception.
    pub struct Close (10, 50, "connection.close") {
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
    /// Confirm a connection close.
    pub struct CloseOk (10, 51, "connection.close-ok") {}
}

method! {
    /// Indicate that connection is blocked (RabbitMQ extension).
    pub struct Blocked (10, 60, "connection.blocked") {
        /// <field name="reason" domain="shortstr"/>
        pub reason: ShortStr,
    }
}

method! {
    /// Indicate that connection is unblocked (RabbitMQ extension).
    pub struct Unblocked (10, 61, "connection.unblocked") {}
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{Start, StartOk};
    use crate::{
        methods::Method,
        primitives::{FieldTable, LongStr},
    };

    #[test]
    fn start_lists_mechanisms_and_locales() {
        let start = Start {
            version_major: 0,
            version_minor: 9,
            server_properties: FieldTable::new(),
            mechanisms: LongStr::from("AMQPLAIN PLAIN"),
            locales: LongStr::from("en_US"),
        };
        assert_eq!(start.mechanisms(), ["AMQPLAIN", "PLAIN"]);
        assert_eq!(start.locales(), ["en_US"]);
    }

    #[test]
    fn start_ok_wire_format() {
        let start_ok = StartOk {
            client_properties: FieldTable::new(),
            mechanism: "PLAIN".into(),
            response: LongStr::from(b"\0foo\0bar".to_vec()),
            locale: "en_US".into(),
        };
        let mut dst = BytesMut::new();
        Method::from(start_ok).encode(&mut dst).unwrap();

        let expected: &[u8] = &[
            0x00, 0x0a, 0x00, 0x0b, // connection.start-ok
            0x00, 0x00, 0x00, 0x00, // empty client-properties
            0x05, b'P', b'L', b'A', b'I', b'N', // mechanism
            0x00, 0x00, 0x00, 0x08, 0x00, b'f', b'o', b'o', 0x00, b'b', b'a', b'r', // response
            0x05, b'e', b'n', b'_', b'U', b'S', // locale
        ];
        assert_eq!(&dst[..], expected);
    }
}
