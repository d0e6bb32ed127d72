//! AMQP 0-9-1 primitive domains and their wire encoding
//!
//! Integers are big-endian. Bits are packed into octets; every method defined in this crate carries at most one
//! bit per run of consecutive bits, so a `bool` argument occupies exactly one octet.

use std::{fmt, ops::Deref};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{DecodeError, EncodeError};

mod table;
pub use table::*;

/// Serialize a value in AMQP 0-9-1 wire format
pub trait Encode {
    /// Appends the wire representation of `self` to `dst`
    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError>;
}

/// Deserialize a value from AMQP 0-9-1 wire format
pub trait Decode: Sized {
    /// Reads one value from the front of `src`
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError>;
}

#[inline]
pub(crate) fn ensure(src: &Bytes, len: usize) -> Result<(), DecodeError> {
    match src.remaining() < len {
        true => Err(DecodeError::Incomplete {
            needed: len - src.remaining(),
        }),
        false => Ok(()),
    }
}

macro_rules! impl_fixed_width {
    ($($ty:ty => $put:ident, $get:ident;)*) => {
        $(
            impl Encode for $ty {
                fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
                    dst.$put(*self);
                    Ok(())
                }
            }

            impl Decode for $ty {
                fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
                    ensure(src, std::mem::size_of::<$ty>())?;
                    Ok(src.$get())
                }
            }
        )*
    };
}

impl_fixed_width! {
    u8 => put_u8, get_u8;
    u16 => put_u16, get_u16;
    u32 => put_u32, get_u32;
    u64 => put_u64, get_u64;
    i8 => put_i8, get_i8;
    i16 => put_i16, get_i16;
    i32 => put_i32, get_i32;
    i64 => put_i64, get_i64;
    f32 => put_f32, get_f32;
    f64 => put_f64, get_f64;
}

impl Encode for bool {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        dst.put_u8(*self as u8);
        Ok(())
    }
}

impl Decode for bool {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        u8::decode(src).map(|octet| octet & 0x01 == 0x01)
    }
}

/// A string of at most 255 bytes prefixed with an octet length
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortStr(String);

impl ShortStr {
    /// Maximum length in bytes
    pub const MAX_LEN: usize = u8::MAX as usize;

    /// Creates an empty short string
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Get a `&str`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner `String`
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Deref for ShortStr {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for ShortStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShortStr {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ShortStr {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<ShortStr> for String {
    fn from(value: ShortStr) -> Self {
        value.0
    }
}

impl PartialEq<str> for ShortStr {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ShortStr {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Encode for ShortStr {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        let len = self.0.len();
        if len > Self::MAX_LEN {
            return Err(EncodeError::ShortStrTooLong(len));
        }
        dst.put_u8(len as u8);
        dst.put_slice(self.0.as_bytes());
        Ok(())
    }
}

impl Decode for ShortStr {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        let len = u8::decode(src)? as usize;
        ensure(src, len)?;
        let buf = src.split_to(len);
        String::from_utf8(buf.to_vec())
            .map(Self)
            .map_err(|_| DecodeError::InvalidUtf8)
    }
}

/// Opaque bytes prefixed with a 32-bit length
///
/// Long strings may carry binary data (eg. a SASL response), so no encoding is assumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LongStr(Bytes);

impl LongStr {
    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Interprets the bytes as UTF-8, replacing invalid sequences
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    /// Consume into the inner `Bytes`
    pub fn into_inner(self) -> Bytes {
        self.0
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the string is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for LongStr {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for LongStr {
    fn from(value: String) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<Vec<u8>> for LongStr {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<Bytes> for LongStr {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl Encode for LongStr {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        let len = u32::try_from(self.0.len()).map_err(|_| EncodeError::TooLong(self.0.len()))?;
        dst.put_u32(len);
        dst.put_slice(&self.0);
        Ok(())
    }
}

impl Decode for LongStr {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        let len = u32::decode(src)? as usize;
        ensure(src, len)?;
        Ok(Self(src.split_to(len)))
    }
}

/// A decimal value, `value / 10^scale`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Decimal {
    /// Number of decimal digits after the point
    pub scale: u8,
    /// Unscaled value
    pub value: u32,
}

impl Encode for Decimal {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        dst.put_u8(self.scale);
        dst.put_u32(self.value);
        Ok(())
    }
}

impl Decode for Decimal {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        let scale = u8::decode(src)?;
        let value = u32::decode(src)?;
        Ok(Self { scale, value })
    }
}

/// Seconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl Encode for Timestamp {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        dst.put_u64(self.0);
        Ok(())
    }
}

impl Decode for Timestamp {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        u64::decode(src).map(Self)
    }
}
