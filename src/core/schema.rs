//! # Packet Schema Registry
//!
//! Declarative byte layouts for every packet kind.
//!
//! Each packet struct generated in [`crate::core::packet`] carries a static
//! [`Schema`]: its type code, its name and the ordered list of fields with
//! their wire kinds. The codec drives encoding and decoding from the generated
//! field order and validates incoming sizes against the layout derived here.
//!
//! Two registries share the mechanism: [`INSIM`](crate::core::packet::INSIM)
//! for host packets (codes 1-64) and [`RELAY`](crate::core::packet::RELAY) for
//! relay gateway packets (codes 250-255).
//!
//! ## Layouts
//! - **Fixed**: every field has a fixed width, the size is known up front
//! - **Text**: a fixed header followed by variable-length text padded to four
//! - **Records**: a fixed header followed by `count` fixed-size sub-records

use crate::core::packet::PacketType;
use crate::error::{ProtocolError, Result};
use std::fmt;

/// Length of the `size` and `type` bytes that open every packet.
pub const PACKET_HEADER_LEN: usize = 2;

/// Largest size expressible by the one-byte size field while staying aligned.
pub const MAX_PACKET_SIZE: usize = 252;

/// Packet sizes are always multiples of this.
pub const PACKET_ALIGNMENT: usize = 4;

/// Wire representation of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Little-endian unsigned integer of the given byte width.
    Unsigned(usize),
    /// Little-endian two's complement integer of the given byte width.
    Signed(usize),
    /// 32-bit IEEE-754 float.
    Float,
    /// Null-padded string in a fixed number of bytes, stripped on decode.
    Str(usize),
    /// Fixed number of bytes kept exactly as received.
    Raw(usize),
    /// Fixed-length array of `len` elements of `width` bytes each.
    Array { width: usize, len: usize },
    /// Embedded sub-record.
    Record { name: &'static str, size: usize },
    /// Trailing field present only in the longer variant of a format.
    Optional(usize),
    /// Variable-length text running to the end of the packet.
    Text { terminated: bool },
    /// `count` sub-records of `size` bytes; `count` names the field holding it.
    Records {
        name: &'static str,
        size: usize,
        count: &'static str,
    },
}

impl FieldKind {
    /// Bytes the field always occupies. Variable and optional fields count
    /// as zero.
    pub const fn base_width(self) -> usize {
        match self {
            FieldKind::Unsigned(w) | FieldKind::Signed(w) => w,
            FieldKind::Float => 4,
            FieldKind::Str(n) | FieldKind::Raw(n) => n,
            FieldKind::Array { width, len } => width * len,
            FieldKind::Record { size, .. } => size,
            FieldKind::Optional(_) | FieldKind::Text { .. } | FieldKind::Records { .. } => 0,
        }
    }

    pub const fn is_variable(self) -> bool {
        matches!(self, FieldKind::Text { .. } | FieldKind::Records { .. })
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Unsigned(w) => write!(f, "u{}", w * 8),
            FieldKind::Signed(w) => write!(f, "i{}", w * 8),
            FieldKind::Float => f.write_str("f32"),
            FieldKind::Str(n) => write!(f, "str[{n}]"),
            FieldKind::Raw(n) => write!(f, "raw[{n}]"),
            FieldKind::Array { width, len } => write!(f, "[{width}b; {len}]"),
            FieldKind::Record { name, .. } => f.write_str(name),
            FieldKind::Optional(w) => write!(f, "optional({w}b)"),
            FieldKind::Text { terminated: true } => f.write_str("text"),
            FieldKind::Text { terminated: false } => f.write_str("raw text"),
            FieldKind::Records { name, count, .. } => write!(f, "{name}[{count}]"),
        }
    }
}

/// One named field of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Byte layout class of a packet kind, sizes include the two header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Fixed {
        size: usize,
    },
    Text {
        header: usize,
        terminated: bool,
    },
    Records {
        header: usize,
        record_size: usize,
        count_offset: usize,
    },
}

/// Declared layout of one packet kind.
#[derive(Debug)]
pub struct Schema {
    pub packet_type: PacketType,
    pub name: &'static str,
    /// Body fields in wire order, after the size and type bytes.
    pub fields: &'static [FieldDef],
}

impl Schema {
    pub fn code(&self) -> u8 {
        self.packet_type.code()
    }

    /// Byte offset of a named field from the start of the packet.
    ///
    /// Only fields preceding any variable-length field have a fixed offset.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        let mut offset = PACKET_HEADER_LEN;
        for field in self.fields {
            if field.name == name {
                return Some(offset);
            }
            if field.kind.is_variable() {
                return None;
            }
            offset += field.kind.base_width();
        }
        None
    }

    pub fn layout(&self) -> Layout {
        let mut header = PACKET_HEADER_LEN;
        for field in self.fields {
            match field.kind {
                FieldKind::Text { terminated } => return Layout::Text { header, terminated },
                FieldKind::Records { size, count, .. } => {
                    return Layout::Records {
                        header,
                        record_size: size,
                        count_offset: self.offset_of(count).unwrap_or(header),
                    }
                }
                kind => header += kind.base_width(),
            }
        }
        Layout::Fixed { size: header }
    }

    /// Length of the fixed part of the packet, header bytes included.
    pub fn header_len(&self) -> usize {
        match self.layout() {
            Layout::Fixed { size } => size,
            Layout::Text { header, .. } | Layout::Records { header, .. } => header,
        }
    }

    /// Longest trailing text this kind can carry, or `None` for non-text kinds.
    pub fn max_text_len(&self) -> Option<usize> {
        match self.layout() {
            Layout::Text { header, terminated } => {
                Some(MAX_PACKET_SIZE - header - usize::from(terminated))
            }
            _ => None,
        }
    }

    /// Most sub-records a counted kind can carry.
    pub fn max_records(&self) -> Option<usize> {
        match self.layout() {
            Layout::Records {
                header,
                record_size,
                ..
            } => Some((MAX_PACKET_SIZE - header) / record_size),
            _ => None,
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code())?;
        for field in self.fields {
            write!(f, " {}:{}", field.name, field.kind)?;
        }
        Ok(())
    }
}

/// Sub-record layouts embedded in packets and telemetry datagrams.
pub trait Record {
    const NAME: &'static str;
    const FIELDS: &'static [FieldDef];
    const SIZE: usize;
}

/// A set of packet kinds sharing one type-code space.
#[derive(Debug)]
pub struct Registry {
    pub name: &'static str,
    pub(crate) types: &'static [PacketType],
}

impl Registry {
    pub fn schema_for(&self, code: u8) -> Result<&'static Schema> {
        PacketType::try_from(code)
            .ok()
            .filter(|ptype| self.types.contains(ptype))
            .map(PacketType::schema)
            .ok_or(ProtocolError::UnknownPacketType(code))
    }

    pub fn contains(&self, code: u8) -> bool {
        self.schema_for(code).is_ok()
    }

    pub fn schemas(&self) -> impl Iterator<Item = &'static Schema> + '_ {
        self.types.iter().map(|ptype| ptype.schema())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Look a type code up in the host registry, then the relay registry.
pub fn schema_for(code: u8) -> Result<&'static Schema> {
    crate::core::packet::INSIM
        .schema_for(code)
        .or_else(|_| crate::core::packet::RELAY.schema_for(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{INSIM, RELAY};

    #[test]
    fn registries_are_disjoint_and_in_range() {
        for schema in INSIM.schemas() {
            assert!((1..=64).contains(&schema.code()), "{}", schema.name);
            assert!(!RELAY.contains(schema.code()));
        }
        for schema in RELAY.schemas() {
            assert!(schema.code() >= 250, "{}", schema.name);
        }
        assert_eq!(INSIM.len(), 64);
        assert_eq!(RELAY.len(), 6);
    }

    #[test]
    fn unknown_codes_fail_closed() {
        assert!(matches!(
            schema_for(0),
            Err(ProtocolError::UnknownPacketType(0))
        ));
        assert!(matches!(
            schema_for(100),
            Err(ProtocolError::UnknownPacketType(100))
        ));
        assert!(matches!(
            INSIM.schema_for(254),
            Err(ProtocolError::UnknownPacketType(254))
        ));
    }

    #[test]
    fn fixed_layouts_are_aligned() {
        for schema in INSIM.schemas().chain(RELAY.schemas()) {
            let header = schema.header_len();
            match schema.layout() {
                Layout::Fixed { size } => {
                    assert_eq!(size % PACKET_ALIGNMENT, 0, "{schema}");
                    assert!(size <= MAX_PACKET_SIZE, "{schema}");
                }
                Layout::Records { record_size, .. } => {
                    assert_eq!(header % PACKET_ALIGNMENT, 0, "{schema}");
                    assert!(record_size > 0, "{schema}");
                }
                Layout::Text { .. } => assert_eq!(header % PACKET_ALIGNMENT, 0, "{schema}"),
            }
        }
    }

    #[test]
    fn known_sizes_match_wire_format() {
        let expected = [
            (1u8, 44usize),
            (2, 20),
            (3, 4),
            (4, 8),
            (5, 28),
            (9, 32),
            (13, 68),
            (17, 28),
            (18, 56),
            (20, 36),
            (21, 76),
            (24, 20),
            (26, 24),
            (34, 20),
            (35, 84),
            (36, 44),
            (39, 100),
            (40, 132),
            (43, 40),
            (47, 104),
            (48, 76),
            (50, 40),
            (51, 24),
            (52, 16),
            (56, 68),
            (58, 16),
            (59, 28),
            (63, 20),
            (253, 4),
            (254, 68),
        ];
        for (code, size) in expected {
            let schema = schema_for(code).unwrap();
            assert_eq!(schema.header_len(), size, "{schema}");
        }
    }

    #[test]
    fn counted_layouts_locate_count_byte() {
        let mci = schema_for(38).unwrap();
        assert_eq!(
            mci.layout(),
            Layout::Records {
                header: 4,
                record_size: 28,
                count_offset: 3
            }
        );
        assert_eq!(mci.max_records(), Some(8));

        let axm = schema_for(54).unwrap();
        assert_eq!(
            axm.layout(),
            Layout::Records {
                header: 8,
                record_size: 8,
                count_offset: 3
            }
        );
    }

    #[test]
    fn text_capacity() {
        assert_eq!(schema_for(14).unwrap().max_text_len(), Some(243));
        assert_eq!(schema_for(45).unwrap().max_text_len(), Some(240));
        assert_eq!(schema_for(13).unwrap().max_text_len(), None);
    }
}
