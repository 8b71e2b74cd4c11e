//! Chat message composition.
//!
//! Picks the packet a text message travels in:
//! - addressed to a connection or player: `MTC`
//! - a command (leading `/`) shorter than 64 bytes: `MST`
//! - anything else shorter than 96 bytes: `MSX`
//! - longer text: `MSX` carrying the first 95 bytes
//!
//! The last case drops the tail of the message without reporting it. Use
//! [`compose_checked`] to get [`ProtocolError::MessageTooLong`] instead.

use crate::core::constants::{snd, COMMAND_PREFIX};
use crate::core::packet::{Msx, Mst, Mtc, Packet};
use crate::core::wire::{FixedStr, Text};
use crate::error::{ProtocolError, Result};

/// Longest text an MST carries.
pub const MST_MAX_LEN: usize = FixedStr::<64>::CAPACITY;

/// Longest text an MSX carries; longer messages are cut to this.
pub const MSX_MAX_LEN: usize = FixedStr::<96>::CAPACITY;

/// Message for everyone on the host. Over-long text is silently truncated.
pub fn compose(msg: &[u8]) -> Packet {
    if msg.first() == Some(&COMMAND_PREFIX) && msg.len() <= MST_MAX_LEN {
        return Mst {
            msg: FixedStr::from(msg),
            ..Default::default()
        }
        .into();
    }
    let len = msg.len().min(MSX_MAX_LEN);
    Msx {
        msg: FixedStr::from(&msg[..len]),
        ..Default::default()
    }
    .into()
}

/// Like [`compose`] but refuses text that would be truncated.
pub fn compose_checked(msg: &[u8]) -> Result<Packet> {
    if msg.len() > MSX_MAX_LEN {
        return Err(ProtocolError::MessageTooLong {
            len: msg.len(),
            max: MSX_MAX_LEN,
        });
    }
    Ok(compose(msg))
}

/// Message shown to one connection (`ucid`) or player (`plid`).
pub fn compose_to(msg: &[u8], ucid: u8, plid: u8) -> Packet {
    Mtc {
        sound: snd::SILENT,
        ucid,
        plid,
        text: Text::from(msg),
        ..Default::default()
    }
    .into()
}
