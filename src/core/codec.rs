//! # Codec
//!
//! Packet encoding and decoding driven by the schema registry, plus a
//! [`FrameCodec`] that cuts a TCP byte stream into frames.
//!
//! ## Wire Format
//! ```text
//! [Size(1)] [Type(1)] [Body(Size - 2)]
//! ```
//! `Size` counts every byte of the packet and is always a multiple of four.
//! Variable-length packets are padded with nulls to the next boundary.
//!
//! ## Framing
//! The first pending byte is the length of the next frame. A zero or
//! unaligned length is a [`ProtocolError::FramingError`]; there is no attempt
//! to resynchronise afterwards.

use crate::core::packet::{Packet, PacketType};
use crate::core::schema::{Layout, MAX_PACKET_SIZE, PACKET_ALIGNMENT, PACKET_HEADER_LEN};
use crate::error::{constants, ProtocolError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Round `len` up to the packet alignment.
#[inline]
pub const fn padded_len(len: usize) -> usize {
    (len + PACKET_ALIGNMENT - 1) / PACKET_ALIGNMENT * PACKET_ALIGNMENT
}

/// Reject a size byte that cannot start a valid frame.
#[inline]
pub fn check_frame_size(size: usize) -> Result<()> {
    if size == 0 {
        return Err(ProtocolError::FramingError(
            constants::ERR_SIZE_ZERO.to_string(),
        ));
    }
    if size % PACKET_ALIGNMENT != 0 {
        return Err(ProtocolError::FramingError(format!(
            "{} (size {size})",
            constants::ERR_SIZE_ALIGNMENT
        )));
    }
    Ok(())
}

/// Encode a packet into a new buffer.
pub fn encode(packet: &Packet) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(packet.schema().header_len() + 8);
    encode_into(packet, &mut buf)?;
    Ok(buf.freeze())
}

/// Append an encoded packet to `dst`. On error `dst` is left unchanged.
pub fn encode_into(packet: &Packet, dst: &mut BytesMut) -> Result<()> {
    let start = dst.len();
    dst.put_u8(0);
    dst.put_u8(packet.packet_type().code());
    packet.encode_body(dst);

    let written = dst.len() - start;
    let size = padded_len(written);
    if size > MAX_PACKET_SIZE {
        dst.truncate(start);
        return Err(ProtocolError::OversizedPacket(size));
    }
    dst.put_bytes(0, size - written);
    dst[start] = size as u8;

    trace!(packet = %packet.packet_type(), size, "encoded packet");
    Ok(())
}

/// Decode one packet from the front of `bytes`.
///
/// Bytes past the declared size are ignored.
pub fn decode(bytes: &[u8]) -> Result<Packet> {
    if bytes.len() < PACKET_HEADER_LEN {
        return Err(ProtocolError::TruncatedPacket {
            needed: PACKET_ALIGNMENT,
            available: bytes.len(),
        });
    }
    let size = usize::from(bytes[0]);
    check_frame_size(size)?;

    let packet_type = PacketType::try_from(bytes[1])?;
    let schema = packet_type.schema();
    if bytes.len() < size {
        return Err(ProtocolError::TruncatedPacket {
            needed: size,
            available: bytes.len(),
        });
    }

    match schema.layout() {
        Layout::Fixed { size: expected } if size < expected => {
            return Err(ProtocolError::TruncatedPacket {
                needed: expected,
                available: size,
            });
        }
        Layout::Fixed { size: expected } if size > expected => {
            return Err(ProtocolError::FramingError(format!(
                "{} declares {size} bytes, layout is {expected}",
                schema.name
            )));
        }
        Layout::Text { header, .. } | Layout::Records { header, .. } if size < header => {
            return Err(ProtocolError::TruncatedPacket {
                needed: header,
                available: size,
            });
        }
        _ => {}
    }

    let mut body = &bytes[PACKET_HEADER_LEN..size];
    Packet::decode_body(packet_type, &mut body)
}

/// Splits a byte stream into raw frames using the leading size byte.
///
/// Frames are returned undecoded so the caller can echo them verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let Some(&first) = src.first() else {
            return Ok(None);
        };
        let size = usize::from(first);
        check_frame_size(size)?;

        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }
        Ok(Some(src.split_to(size).freeze()))
    }
}

impl Encoder<Packet> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<()> {
        encode_into(&packet, dst)
    }
}

impl Encoder<&Packet> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: &Packet, dst: &mut BytesMut) -> Result<()> {
        encode_into(packet, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::tiny;
    use crate::core::packet::{Btn, Cpr, Isi, Mci, Mst, Mtc, Tiny};
    use crate::core::records::CompCar;
    use crate::core::wire::{FixedStr, RawBytes, RawText, Text};

    #[test]
    fn every_default_packet_round_trips() {
        for &ptype in PacketType::ALL {
            let packet = ptype.default_packet();
            let bytes = encode(&packet).unwrap();
            assert_eq!(bytes.len() % 4, 0, "{ptype}");
            assert_eq!(usize::from(bytes[0]), bytes.len(), "{ptype}");
            assert_eq!(bytes[1], ptype.code());
            assert_eq!(decode(&bytes).unwrap(), packet, "{ptype}");
        }
    }

    #[test]
    fn fixed_packets_match_layout_size() {
        for &ptype in PacketType::ALL {
            if let Layout::Fixed { size } = ptype.schema().layout() {
                let bytes = encode(&ptype.default_packet()).unwrap();
                assert_eq!(bytes.len(), size, "{ptype}");
            }
        }
    }

    #[test]
    fn isi_wire_bytes() {
        let isi = Isi {
            req_i: 1,
            udp_port: 29999,
            flags: 32,
            insim_ver: 8,
            prefix: b'!',
            interval: 500,
            admin: FixedStr::from("pass"),
            iname: FixedStr::from("demo"),
            ..Default::default()
        };
        let bytes = encode(&isi.into()).unwrap();
        assert_eq!(bytes.len(), 44);
        assert_eq!(&bytes[..4], &[44, 1, 1, 0]);
        assert_eq!(&bytes[4..6], &29999u16.to_le_bytes());
        assert_eq!(&bytes[6..8], &[32, 0]);
        assert_eq!(bytes[8], 8);
        assert_eq!(bytes[9], b'!');
        assert_eq!(&bytes[10..12], &500u16.to_le_bytes());
        assert_eq!(&bytes[12..16], b"pass");
        assert_eq!(&bytes[28..32], b"demo");
    }

    #[test]
    fn text_padding_and_size() {
        let mtc = Mtc {
            ucid: 3,
            text: Text::from("hello"),
            ..Default::default()
        };
        let bytes = encode(&mtc.clone().into()).unwrap();
        // 8 byte header, 5 chars + terminator rounded up to 8
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[8..16], b"hello\0\0\0");
        assert_eq!(decode(&bytes).unwrap(), Packet::Mtc(mtc));
    }

    #[test]
    fn text_filling_the_boundary_gets_a_terminator_block() {
        let mtc = Mtc {
            text: Text::from("abcd"),
            ..Default::default()
        };
        let bytes = encode(&mtc.into()).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[12..], &[0, 0, 0, 0]);
    }

    #[test]
    fn empty_text() {
        let mtc = Mtc::default();
        let bytes = encode(&mtc.clone().into()).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode(&bytes).unwrap(), Packet::Mtc(mtc));
    }

    #[test]
    fn button_text_is_not_terminated() {
        let btn = Btn {
            text: RawText::from("abcd"),
            ..Default::default()
        };
        let bytes = encode(&btn.clone().into()).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode(&bytes).unwrap(), Packet::Btn(btn));
    }

    #[test]
    fn oversized_text_is_rejected() {
        let mtc = Mtc {
            text: Text::new(vec![b'x'; 244]),
            ..Default::default()
        };
        assert!(matches!(
            encode(&mtc.into()),
            Err(ProtocolError::OversizedPacket(256))
        ));

        let fits = Mtc {
            text: Text::new(vec![b'x'; 243]),
            ..Default::default()
        };
        assert_eq!(encode(&fits.into()).unwrap().len(), 252);
    }

    #[test]
    fn encode_into_leaves_buffer_intact_on_error() {
        let mut buf = BytesMut::from(&b"keep"[..]);
        let btn = Btn {
            text: RawText::new(vec![b'y'; 250]),
            ..Default::default()
        };
        assert!(encode_into(&btn.into(), &mut buf).is_err());
        assert_eq!(&buf[..], b"keep");
    }

    #[test]
    fn plate_keeps_all_eight_bytes() {
        let cpr = Cpr {
            ucid: 2,
            pname: FixedStr::from("driver"),
            plate: RawBytes::from("LFS-2020"),
            ..Default::default()
        };
        let bytes = encode(&cpr.clone().into()).unwrap();
        assert_eq!(&bytes[28..36], b"LFS-2020");
        assert_eq!(decode(&bytes).unwrap(), Packet::Cpr(cpr));
    }

    #[test]
    fn long_fixed_string_is_truncated_to_capacity() {
        let mst = Mst {
            msg: FixedStr::new(vec![b'a'; 80]),
            ..Default::default()
        };
        let bytes = encode(&mst.into()).unwrap();
        assert_eq!(bytes.len(), 68);
        match decode(&bytes).unwrap() {
            Packet::Mst(mst) => assert_eq!(mst.msg.len(), 63),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn count_byte_follows_list_length() {
        let mci = Mci {
            req_i: 0,
            num_c: 0,
            info: vec![
                CompCar {
                    plid: 1,
                    ..Default::default()
                },
                CompCar {
                    plid: 2,
                    speed: 3000,
                    ..Default::default()
                },
            ],
        };
        let bytes = encode(&mci.into()).unwrap();
        assert_eq!(bytes.len(), 4 + 2 * 28);
        assert_eq!(bytes[3], 2);
        match decode(&bytes).unwrap() {
            Packet::Mci(decoded) => {
                assert_eq!(decoded.num_c, 2);
                assert_eq!(decoded.info[1].speed, 3000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn count_larger_than_body_is_truncation() {
        // claims three cars but carries one
        let mut bytes = encode(&Mci::new(0, vec![CompCar::default()]).into())
            .unwrap()
            .to_vec();
        bytes[3] = 3;
        assert!(matches!(
            decode(&bytes),
            Err(ProtocolError::TruncatedPacket { .. })
        ));
    }

    #[test]
    fn decode_errors() {
        assert!(matches!(
            decode(&[4, 99, 0, 0]),
            Err(ProtocolError::UnknownPacketType(99))
        ));
        assert!(matches!(
            decode(&[0, 3, 0, 0]),
            Err(ProtocolError::FramingError(_))
        ));
        assert!(matches!(
            decode(&[5, 3, 0, 0, 0]),
            Err(ProtocolError::FramingError(_))
        ));
        assert!(matches!(
            decode(&[8, 4, 0, 0]),
            Err(ProtocolError::TruncatedPacket {
                needed: 8,
                available: 4
            })
        ));
        assert!(matches!(
            decode(&[4, 4, 0, 0]),
            Err(ProtocolError::TruncatedPacket { .. })
        ));
        assert!(matches!(
            decode(&[8, 3, 0, 0, 0, 0, 0, 0]),
            Err(ProtocolError::FramingError(_))
        ));
        assert!(matches!(
            decode(&[4]),
            Err(ProtocolError::TruncatedPacket { .. })
        ));
    }

    #[test]
    fn frame_codec_waits_for_full_frame() {
        let keepalive = encode(&Tiny::new(0, tiny::NONE).into()).unwrap();
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&keepalive[..3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&keepalive[3..]);
        buf.extend_from_slice(&[8, 4]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), keepalive);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], &[8, 4]);
    }

    #[test]
    fn frame_codec_rejects_bad_size() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::from(&[6u8, 3, 0, 0, 0, 0][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::FramingError(_))
        ));
        let mut zero = BytesMut::from(&[0u8][..]);
        assert!(codec.decode(&mut zero).is_err());
    }

    #[test]
    fn frame_codec_encodes_packets() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        codec.encode(Packet::from(Tiny::new(5, tiny::PING)), &mut buf).unwrap();
        assert_eq!(&buf[..], &[4, 3, 5, tiny::PING]);
    }
}
