use std::ops::{Deref, DerefMut};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use indexmap::IndexMap;

use super::{ensure, Decimal, Decode, Encode, LongStr, ShortStr, Timestamp};
use crate::{DecodeError, EncodeError};

/// A value held in a [`FieldTable`] or [`FieldArray`]
///
/// Type tags follow the RabbitMQ errata of the 0-9-1 specification, which is what brokers put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `t`
    Boolean(bool),
    /// `b`
    ShortShortInt(i8),
    /// `B`
    ShortShortUint(u8),
    /// `s`
    ShortInt(i16),
    /// `u`
    ShortUint(u16),
    /// `I`
    LongInt(i32),
    /// `i`
    LongUint(u32),
    /// `l`
    LongLongInt(i64),
    /// `f`
    Float(f32),
    /// `d`
    Double(f64),
    /// `D`
    Decimal(Decimal),
    /// `S`
    LongStr(LongStr),
    /// `A`
    FieldArray(FieldArray),
    /// `T`
    Timestamp(Timestamp),
    /// `F`
    FieldTable(FieldTable),
    /// `V`
    Void,
    /// `x`
    ByteArray(Bytes),
}

impl FieldValue {
    /// The one-octet type tag written before the value
    pub fn type_tag(&self) -> u8 {
        match self {
            FieldValue::Boolean(_) => b't',
            FieldValue::ShortShortInt(_) => b'b',
            FieldValue::ShortShortUint(_) => b'B',
            FieldValue::ShortInt(_) => b's',
            FieldValue::ShortUint(_) => b'u',
            FieldValue::LongInt(_) => b'I',
            FieldValue::LongUint(_) => b'i',
            FieldValue::LongLongInt(_) => b'l',
            FieldValue::Float(_) => b'f',
            FieldValue::Double(_) => b'd',
            FieldValue::Decimal(_) => b'D',
            FieldValue::LongStr(_) => b'S',
            FieldValue::FieldArray(_) => b'A',
            FieldValue::Timestamp(_) => b'T',
            FieldValue::FieldTable(_) => b'F',
            FieldValue::Void => b'V',
            FieldValue::ByteArray(_) => b'x',
        }
    }

    /// Returns the boolean if this is a `Boolean`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the nested table if this is a `FieldTable`
    pub fn as_table(&self) -> Option<&FieldTable> {
        match self {
            FieldValue::FieldTable(table) => Some(table),
            _ => None,
        }
    }

    /// Returns the bytes if this is a `LongStr`
    pub fn as_long_str(&self) -> Option<&LongStr> {
        match self {
            FieldValue::LongStr(value) => Some(value),
            _ => None,
        }
    }
}

impl Encode for FieldValue {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        dst.put_u8(self.type_tag());
        match self {
            FieldValue::Boolean(value) => value.encode(dst),
            FieldValue::ShortShortInt(value) => value.encode(dst),
            FieldValue::ShortShortUint(value) => value.encode(dst),
            FieldValue::ShortInt(value) => value.encode(dst),
            FieldValue::ShortUint(value) => value.encode(dst),
            FieldValue::LongInt(value) => value.encode(dst),
            FieldValue::LongUint(value) => value.encode(dst),
            FieldValue::LongLongInt(value) => value.encode(dst),
            FieldValue::Float(value) => value.encode(dst),
            FieldValue::Double(value) => value.encode(dst),
            FieldValue::Decimal(value) => value.encode(dst),
            FieldValue::LongStr(value) => value.encode(dst),
            FieldValue::FieldArray(value) => value.encode(dst),
            FieldValue::Timestamp(value) => value.encode(dst),
            FieldValue::FieldTable(value) => value.encode(dst),
            FieldValue::Void => Ok(()),
            FieldValue::ByteArray(value) => LongStr::from(value.clone()).encode(dst),
        }
    }
}

/// Maximum number of tables and arrays nested inside one another
pub const MAX_NESTING: usize = 64;

impl Decode for FieldValue {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        FieldValue::decode_nested(src, 0)
    }
}

impl FieldValue {
    fn decode_nested(src: &mut Bytes, depth: usize) -> Result<Self, DecodeError> {
        let tag = u8::decode(src)?;
        let value = match tag {
            b't' => FieldValue::Boolean(Decode::decode(src)?),
            b'b' => FieldValue::ShortShortInt(Decode::decode(src)?),
            b'B' => FieldValue::ShortShortUint(Decode::decode(src)?),
            b's' => FieldValue::ShortInt(Decode::decode(src)?),
            b'u' => FieldValue::ShortUint(Decode::decode(src)?),
            b'I' => FieldValue::LongInt(Decode::decode(src)?),
            b'i' => FieldValue::LongUint(Decode::decode(src)?),
            b'l' => FieldValue::LongLongInt(Decode::decode(src)?),
            b'f' => FieldValue::Float(Decode::decode(src)?),
            b'd' => FieldValue::Double(Decode::decode(src)?),
            b'D' => FieldValue::Decimal(Decode::decode(src)?),
            b'S' => FieldValue::LongStr(Decode::decode(src)?),
            b'A' => FieldValue::FieldArray(FieldArray::decode_nested(src, depth + 1)?),
            b'T' => FieldValue::Timestamp(Decode::decode(src)?),
            b'F' => FieldValue::FieldTable(FieldTable::decode_nested(src, depth + 1)?),
            b'V' => FieldValue::Void,
            b'x' => FieldValue::ByteArray(LongStr::decode(src)?.into_inner()),
            other => return Err(DecodeError::UnknownFieldType(other)),
        };
        Ok(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::LongInt(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::LongLongInt(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::LongStr(LongStr::from(value))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::LongStr(LongStr::from(value))
    }
}

impl From<FieldTable> for FieldValue {
    fn from(value: FieldTable) -> Self {
        FieldValue::FieldTable(value)
    }
}

impl From<FieldArray> for FieldValue {
    fn from(value: FieldArray) -> Self {
        FieldValue::FieldArray(value)
    }
}

/// Writes `body` into `dst` behind a 32-bit length prefix
fn encode_sized(
    dst: &mut BytesMut,
    body: impl FnOnce(&mut BytesMut) -> Result<(), EncodeError>,
) -> Result<(), EncodeError> {
    let start = dst.len();
    dst.put_u32(0); // placeholder
    body(dst)?;
    let len = dst.len() - start - 4;
    let len = u32::try_from(len).map_err(|_| EncodeError::TooLong(len))?;
    dst[start..start + 4].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

/// Splits off the bytes of a 32-bit length prefixed value
fn decode_sized(src: &mut Bytes) -> Result<Bytes, DecodeError> {
    let len = u32::decode(src)? as usize;
    ensure(src, len)?;
    Ok(src.split_to(len))
}

/// An ordered map of short string names to field values
///
/// Insertion order is kept so that encoding is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTable(IndexMap<ShortStr, FieldValue>);

impl FieldTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Inserts a value, returning the previous value under the same name
    pub fn insert(
        &mut self,
        name: impl Into<ShortStr>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.0.insert(name.into(), value.into())
    }

    /// Builder style [`insert`](#method.insert)
    pub fn with(mut self, name: impl Into<ShortStr>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Get a value by name
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(&ShortStr::from(name))
    }
}

impl Deref for FieldTable {
    type Target = IndexMap<ShortStr, FieldValue>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for FieldTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<K, V> FromIterator<(K, V)> for FieldTable
where
    K: Into<ShortStr>,
    V: Into<FieldValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl Encode for FieldTable {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        encode_sized(dst, |dst| {
            for (name, value) in self.0.iter() {
                name.encode(dst)?;
                value.encode(dst)?;
            }
            Ok(())
        })
    }
}

impl Decode for FieldTable {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        FieldTable::decode_nested(src, 0)
    }
}

impl FieldTable {
    fn decode_nested(src: &mut Bytes, depth: usize) -> Result<Self, DecodeError> {
        if depth > MAX_NESTING {
            return Err(DecodeError::NestingTooDeep(MAX_NESTING));
        }
        let mut body = decode_sized(src)?;
        let mut map = IndexMap::new();
        while body.has_remaining() {
            let name = ShortStr::decode(&mut body)?;
            let value = FieldValue::decode_nested(&mut body, depth)?;
            map.insert(name, value);
        }
        Ok(Self(map))
    }
}

/// A list of field values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldArray(pub Vec<FieldValue>);

impl Encode for FieldArray {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        encode_sized(dst, |dst| {
            for value in self.0.iter() {
                value.encode(dst)?;
            }
            Ok(())
        })
    }
}

impl Decode for FieldArray {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        FieldArray::decode_nested(src, 0)
    }
}

impl FieldArray {
    fn decode_nested(src: &mut Bytes, depth: usize) -> Result<Self, DecodeError> {
        if depth > MAX_NESTING {
            return Err(DecodeError::NestingTooDeep(MAX_NESTING));
        }
        let mut body = decode_sized(src)?;
        let mut values = Vec::new();
        while body.has_remaining() {
            values.push(FieldValue::decode_nested(&mut body, depth)?);
        }
        Ok(Self(values))
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::{FieldArray, FieldTable, FieldValue, MAX_NESTING};
    use crate::{
        primitives::{Decode, Encode},
        DecodeError,
    };

    #[test]
    fn table_wire_format() {
        let table = FieldTable::new().with("a", true).with("bc", "x");
        let mut dst = BytesMut::new();
        table.encode(&mut dst).unwrap();

        let expected: &[u8] = &[
            0, 0, 0, 13, // table size
            1, b'a', b't', 1, // "a" => true
            2, b'b', b'c', b'S', 0, 0, 0, 1, b'x', // "bc" => "x"
        ];
        assert_eq!(&dst[..], expected);
    }

    #[test]
    fn nested_table_keeps_insertion_order() {
        let capabilities = FieldTable::new()
            .with("publisher_confirms", true)
            .with("connection.blocked", true);
        let table = FieldTable::new()
            .with("product", "amqp091")
            .with("capabilities", capabilities);

        let mut dst = BytesMut::new();
        table.encode(&mut dst).unwrap();
        let decoded = FieldTable::decode(&mut dst.freeze()).unwrap();

        let names: Vec<&str> = decoded.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, ["product", "capabilities"]);
        let nested = decoded.get("capabilities").and_then(FieldValue::as_table).unwrap();
        assert_eq!(nested.get("connection.blocked"), Some(&FieldValue::Boolean(true)));
    }

    #[test]
    fn unknown_field_type_is_rejected() {
        let mut src = Bytes::from_static(&[0, 0, 0, 3, 1, b'k', b'?']);
        let err = FieldTable::decode(&mut src).unwrap_err();
        assert_eq!(err, DecodeError::UnknownFieldType(b'?'));
    }

    #[test]
    fn table_size_larger_than_input_is_incomplete() {
        let mut src = Bytes::from_static(&[0, 0, 0, 9, 1, b'k', b'V']);
        assert!(matches!(
            FieldTable::decode(&mut src),
            Err(DecodeError::Incomplete { needed: 6 })
        ));
    }

    /// An empty field array wrapped in `levels` more arrays
    fn nested_arrays(levels: usize) -> Bytes {
        let mut dst = BytesMut::with_capacity(levels * 5 + 4);
        for level in (1..=levels).rev() {
            dst.put_u32((level * 5) as u32);
            dst.put_u8(b'A');
        }
        dst.put_u32(0);
        dst.freeze()
    }

    #[test]
    fn nesting_up_to_the_limit_decodes() {
        let mut src = nested_arrays(MAX_NESTING);
        assert!(FieldArray::decode(&mut src).is_ok());
    }

    #[test]
    fn deeply_nested_arrays_are_rejected() {
        let mut src = nested_arrays(25_000);
        let err = FieldArray::decode(&mut src).unwrap_err();
        assert_eq!(err, DecodeError::NestingTooDeep(MAX_NESTING));
    }

    #[test]
    fn deeply_nested_tables_are_rejected() {
        let mut table = FieldTable::new();
        for _ in 0..MAX_NESTING + 1 {
            table = FieldTable::new().with("t", table);
        }
        let mut dst = BytesMut::new();
        table.encode(&mut dst).unwrap();
        let err = FieldTable::decode(&mut dst.freeze()).unwrap_err();
        assert_eq!(err, DecodeError::NestingTooDeep(MAX_NESTING));
    }
}
