//! # Field Wire Encoding
//!
//! The [`Wire`] trait maps each Rust field type onto its byte representation.
//! Integers are little-endian, floats are IEEE-754 single precision.
//!
//! ## String Types
//! - [`FixedStr`]: null-padded text in `N` bytes. At most `N - 1` bytes are
//!   written so the field always keeps a terminator; trailing nulls are
//!   stripped on decode.
//! - [`RawBytes`]: `N` bytes kept exactly as received. Used for number plates,
//!   which fill all eight bytes with no guaranteed terminator.
//! - [`Text`]: trailing variable-length text followed by one null.
//! - [`RawText`]: trailing variable-length text with no terminator of its own.

use crate::core::schema::{FieldKind, Record};
use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::borrow::Cow;
use std::fmt;

/// A value with a fixed position in a packet body.
pub trait Wire: Sized {
    const KIND: FieldKind;

    fn write(&self, buf: &mut BytesMut);

    /// Read the value from the front of `buf`, advancing it.
    fn read(buf: &mut &[u8]) -> Result<Self>;
}

/// A list of sub-records whose length lives in a separate count field.
pub trait Counted: Sized {
    const RECORD_NAME: &'static str;
    const RECORD_SIZE: usize;

    fn count(&self) -> usize;
    fn write_all(&self, buf: &mut BytesMut);
    fn read_counted(buf: &mut &[u8], count: usize) -> Result<Self>;
}

#[inline]
pub(crate) fn ensure(buf: &[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(ProtocolError::TruncatedPacket {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    ensure(buf, n)?;
    let (head, rest) = buf.split_at(n);
    *buf = rest;
    Ok(head)
}

fn strip_nulls(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

macro_rules! wire_number {
    ($($ty:ty => $kind:expr, $get:ident, $put:ident;)*) => {$(
        impl Wire for $ty {
            const KIND: FieldKind = $kind;

            #[inline]
            fn write(&self, buf: &mut BytesMut) {
                buf.$put(*self);
            }

            #[inline]
            fn read(buf: &mut &[u8]) -> Result<Self> {
                ensure(buf, std::mem::size_of::<$ty>())?;
                Ok(buf.$get())
            }
        }
    )*};
}

wire_number! {
    u8 => FieldKind::Unsigned(1), get_u8, put_u8;
    i8 => FieldKind::Signed(1), get_i8, put_i8;
    u16 => FieldKind::Unsigned(2), get_u16_le, put_u16_le;
    i16 => FieldKind::Signed(2), get_i16_le, put_i16_le;
    u32 => FieldKind::Unsigned(4), get_u32_le, put_u32_le;
    i32 => FieldKind::Signed(4), get_i32_le, put_i32_le;
    f32 => FieldKind::Float, get_f32_le, put_f32_le;
}

impl<T: Wire, const N: usize> Wire for [T; N] {
    const KIND: FieldKind = FieldKind::Array {
        width: T::KIND.base_width(),
        len: N,
    };

    fn write(&self, buf: &mut BytesMut) {
        for item in self {
            item.write(buf);
        }
    }

    fn read(buf: &mut &[u8]) -> Result<Self> {
        let items = (0..N)
            .map(|_| T::read(buf))
            .collect::<Result<Vec<T>>>()?;
        items.try_into().map_err(|items: Vec<T>| {
            ProtocolError::Custom(format!("expected {N} array elements, read {}", items.len()))
        })
    }
}

/// Trailing optional field, written only when present and read only when
/// bytes remain.
impl<T: Wire> Wire for Option<T> {
    const KIND: FieldKind = FieldKind::Optional(T::KIND.base_width());

    fn write(&self, buf: &mut BytesMut) {
        if let Some(value) = self {
            value.write(buf);
        }
    }

    fn read(buf: &mut &[u8]) -> Result<Self> {
        if buf.is_empty() {
            Ok(None)
        } else {
            T::read(buf).map(Some)
        }
    }
}

impl<R: Wire + Record> Counted for Vec<R> {
    const RECORD_NAME: &'static str = R::NAME;
    const RECORD_SIZE: usize = R::SIZE;

    fn count(&self) -> usize {
        self.len()
    }

    fn write_all(&self, buf: &mut BytesMut) {
        for record in self {
            record.write(buf);
        }
    }

    fn read_counted(buf: &mut &[u8], count: usize) -> Result<Self> {
        ensure(buf, count * R::SIZE)?;
        (0..count).map(|_| R::read(buf)).collect()
    }
}

macro_rules! byte_string {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Default, PartialEq, Eq, Hash)]
        pub struct $name(Vec<u8>);

        impl $name {
            pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
                Self(bytes.into())
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn into_bytes(self) -> Vec<u8> {
                self.0
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Lossy view of the bytes; the wire charset is not decoded here.
            pub fn to_string_lossy(&self) -> Cow<'_, str> {
                String::from_utf8_lossy(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", self.to_string_lossy())
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.as_bytes().to_vec())
            }
        }

        impl From<&[u8]> for $name {
            fn from(value: &[u8]) -> Self {
                Self(value.to_vec())
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(value: Vec<u8>) -> Self {
                Self(value)
            }
        }
    };
    ($(#[$meta:meta])* $name:ident<N>) => {
        $(#[$meta])*
        #[derive(Clone, Default, PartialEq, Eq, Hash)]
        pub struct $name<const N: usize>(Vec<u8>);

        impl<const N: usize> $name<N> {
            pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
                Self(bytes.into())
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn into_bytes(self) -> Vec<u8> {
                self.0
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn to_string_lossy(&self) -> Cow<'_, str> {
                String::from_utf8_lossy(&self.0)
            }
        }

        impl<const N: usize> fmt::Debug for $name<N> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", self.to_string_lossy())
            }
        }

        impl<const N: usize> From<&str> for $name<N> {
            fn from(value: &str) -> Self {
                Self(value.as_bytes().to_vec())
            }
        }

        impl<const N: usize> From<&[u8]> for $name<N> {
            fn from(value: &[u8]) -> Self {
                Self(value.to_vec())
            }
        }

        impl<const N: usize> From<Vec<u8>> for $name<N> {
            fn from(value: Vec<u8>) -> Self {
                Self(value)
            }
        }
    };
}

byte_string! {
    /// Null-padded string occupying `N` bytes on the wire.
    FixedStr<N>
}

/// Exactly `N` bytes carried verbatim.
///
/// Shorter input is padded with nulls and longer input truncated when the
/// value is built, so a decoded value always equals the encoded one.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RawBytes<const N: usize>(Vec<u8>);

impl<const N: usize> RawBytes<N> {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let mut bytes = bytes.into();
        bytes.resize(N, 0);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The bytes before the first null, for display.
    pub fn trimmed(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(N);
        &self.0[..end]
    }
}

impl<const N: usize> Default for RawBytes<N> {
    fn default() -> Self {
        Self(vec![0; N])
    }
}

impl<const N: usize> fmt::Debug for RawBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl<const N: usize> From<&str> for RawBytes<N> {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl<const N: usize> From<&[u8]> for RawBytes<N> {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

byte_string! {
    /// Variable-length trailing text terminated by a null byte.
    Text
}

byte_string! {
    /// Variable-length trailing text without a terminator.
    RawText
}

impl<const N: usize> FixedStr<N> {
    /// Bytes that survive encoding.
    pub const CAPACITY: usize = N - 1;
}

impl<const N: usize> Wire for FixedStr<N> {
    const KIND: FieldKind = FieldKind::Str(N);

    fn write(&self, buf: &mut BytesMut) {
        let len = self.0.len().min(N - 1);
        buf.put_slice(&self.0[..len]);
        buf.put_bytes(0, N - len);
    }

    fn read(buf: &mut &[u8]) -> Result<Self> {
        let raw = take(buf, N)?;
        Ok(Self(strip_nulls(raw).to_vec()))
    }
}

impl<const N: usize> Wire for RawBytes<N> {
    const KIND: FieldKind = FieldKind::Raw(N);

    fn write(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.0);
    }

    fn read(buf: &mut &[u8]) -> Result<Self> {
        take(buf, N).map(|raw| Self(raw.to_vec()))
    }
}

impl Wire for Text {
    const KIND: FieldKind = FieldKind::Text { terminated: true };

    fn write(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.0);
        buf.put_u8(0);
    }

    fn read(buf: &mut &[u8]) -> Result<Self> {
        let text = strip_nulls(buf).to_vec();
        *buf = &[];
        Ok(Self(text))
    }
}

impl Wire for RawText {
    const KIND: FieldKind = FieldKind::Text { terminated: false };

    fn write(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.0);
    }

    fn read(buf: &mut &[u8]) -> Result<Self> {
        let text = strip_nulls(buf).to_vec();
        *buf = &[];
        Ok(Self(text))
    }
}

/// Declare sub-record structs with their [`Wire`] and [`Record`] impls.
macro_rules! records {
    ($(
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),* $(,)?
        }
    )*) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl $crate::core::schema::Record for $name {
            const NAME: &'static str = stringify!($name);
            const FIELDS: &'static [$crate::core::schema::FieldDef] = &[
                $( $crate::core::schema::FieldDef {
                    name: stringify!($field),
                    kind: <$ty as $crate::core::wire::Wire>::KIND,
                }, )*
            ];
            const SIZE: usize = 0 $( + <$ty as $crate::core::wire::Wire>::KIND.base_width() )*;
        }

        impl $crate::core::wire::Wire for $name {
            const KIND: $crate::core::schema::FieldKind = $crate::core::schema::FieldKind::Record {
                name: stringify!($name),
                size: <Self as $crate::core::schema::Record>::SIZE,
            };

            fn write(&self, buf: &mut ::bytes::BytesMut) {
                $( $crate::core::wire::Wire::write(&self.$field, buf); )*
            }

            fn read(buf: &mut &[u8]) -> $crate::error::Result<Self> {
                $( let $field = <$ty as $crate::core::wire::Wire>::read(buf)?; )*
                Ok(Self { $( $field, )* })
            }
        }
    )*};
}

pub(crate) use records;
