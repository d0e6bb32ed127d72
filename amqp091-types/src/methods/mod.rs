//! Methods of the `connection` and `channel` classes
//!
//! A method payload starts with the class id and method id (two big-endian shorts) followed by the method
//! arguments. [`Method`] is the tagged variant over all known (class id, method id) pairs.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    primitives::{Decode, Encode},
    DecodeError, EncodeError,
};

/// Class ids
pub mod class {
    /// `connection` class
    pub const CONNECTION: u16 = 10;

    /// `channel` class
    pub const CHANNEL: u16 = 20;
}

/// Identity of a method on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodId {
    /// Class id
    pub class_id: u16,

    /// Method id within the class
    pub method_id: u16,
}

impl MethodId {
    /// Creates a new method id
    pub const fn new(class_id: u16, method_id: u16) -> Self {
        Self {
            class_id,
            method_id,
        }
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class_id, self.method_id)
    }
}

/// A concrete method type
pub trait MethodType: Encode + Decode + Into<Method> {
    /// (class id, method id) of the method
    const ID: MethodId;

    /// `class.method` name of the method
    const NAME: &'static str;
}

/// Declares a method struct whose arguments are encoded in declaration order
macro_rules! method {
    (
        $(#[$meta:meta])*
        pub struct $name:ident ($class_id:expr, $method_id:expr, $label:literal) {
            $(
                $(#[$field_meta:meta])*
                pub $field:ident: $field_ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $field_ty,
            )*
        }

        impl $crate::methods::MethodType for $name {
            const ID: $crate::methods::MethodId =
                $crate::methods::MethodId::new($class_id, $method_id);
            const NAME: &'static str = $label;
        }

        impl $crate::primitives::Encode for $name {
            fn encode(&self, _dst: &mut bytes::BytesMut) -> Result<(), $crate::EncodeError> {
                $( $crate::primitives::Encode::encode(&self.$field, _dst)?; )*
                Ok(())
            }
        }

        impl $crate::primitives::Decode for $name {
            fn decode(_src: &mut bytes::Bytes) -> Result<Self, $crate::DecodeError> {
                Ok(Self {
                    $( $field: $crate::primitives::Decode::decode(_src)?, )*
                })
            }
        }
    };
}

pub mod channel;
pub mod connection;

/// Declares [`Method`] over the given method types
macro_rules! method_enum {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// A decoded method of the `connection` or `channel` class
        #[derive(Debug, Clone, PartialEq)]
        pub enum Method {
            $(
                #[doc = concat!("`", stringify!($ty), "`")]
                $variant($ty),
            )*
        }

        impl Method {
            /// (class id, method id) of the method
            pub fn id(&self) -> MethodId {
                match self {
                    $( Method::$variant(_) => <$ty as MethodType>::ID, )*
                }
            }

            /// `class.method` name of the method
            pub fn name(&self) -> &'static str {
                match self {
                    $( Method::$variant(_) => <$ty as MethodType>::NAME, )*
                }
            }

            /// `class.method` name of a known method id
            pub fn name_of(id: MethodId) -> Option<&'static str> {
                $(
                    if id == <$ty as MethodType>::ID {
                        return Some(<$ty as MethodType>::NAME);
                    }
                )*
                None
            }

            fn encode_arguments(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
                match self {
                    $( Method::$variant(method) => method.encode(dst), )*
                }
            }

            fn decode_arguments(id: MethodId, src: &mut Bytes) -> Result<Self, DecodeError> {
                $(
                    if id == <$ty as MethodType>::ID {
                        return <$ty as Decode>::decode(src).map(Method::$variant);
                    }
                )*
                Err(DecodeError::UnknownMethod {
                    class_id: id.class_id,
                    method_id: id.method_id,
                })
            }
        }

        $(
            impl From<$ty> for Method {
                fn from(method: $ty) -> Self {
                    Method::$variant(method)
                }
            }
        )*
    };
}

method_enum! {
    ConnectionStart(connection::Start),
    ConnectionStartOk(connection::StartOk),
    ConnectionSecure(connection::Secure),
    ConnectionSecureOk(connection::SecureOk),
    ConnectionTune(connection::Tune),
    ConnectionTuneOk(connection::TuneOk),
    ConnectionOpen(connection::Open),
    ConnectionOpenOk(connection::OpenOk),
    ConnectionClose(connection::Close),
    ConnectionCloseOk(connection::CloseOk),
    ConnectionBlocked(connection::Blocked),
    ConnectionUnblocked(connection::Unblocked),
    ChannelOpen(channel::Open),
    ChannelOpenOk(channel::OpenOk),
    ChannelFlow(channel::Flow),
    ChannelFlowOk(channel::FlowOk),
    ChannelClose(channel::Close),
    ChannelCloseOk(channel::CloseOk),
}

impl Method {
    /// Writes the class id, method id and arguments
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        let id = self.id();
        dst.put_u16(id.class_id);
        dst.put_u16(id.method_id);
        self.encode_arguments(dst)
    }

    /// Reads a complete method payload
    ///
    /// The whole of `src` must be consumed by the method arguments.
    pub fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        let class_id = u16::decode(src)?;
        let method_id = u16::decode(src)?;
        let method = Self::decode_arguments(MethodId::new(class_id, method_id), src)?;
        match src.remaining() {
            0 => Ok(method),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }

    /// Whether the method belongs to the `connection` class and must travel on channel 0
    pub fn is_connection_class(&self) -> bool {
        self.id().class_id == class::CONNECTION
    }
}
