//! # Telemetry Datagrams
//!
//! OutSim and OutGauge are plain UDP payloads without a size/type header.
//! They are told apart from typed packets by their length alone:
//!
//! | Format   | Base size | With trailing id |
//! |----------|-----------|------------------|
//! | OutSim   | 64        | 68               |
//! | OutGauge | 92        | 96               |
//!
//! Any other length is treated as a typed packet arriving over UDP.

use crate::core::schema::Record;
use crate::core::wire::{records, FixedStr, Wire};
use crate::error::{ProtocolError, Result};
use bytes::BytesMut;

records! {
    /// Motion state of the viewed car.
    OutSim {
        time: u32,
        ang_vel: [f32; 3],
        heading: f32,
        pitch: f32,
        roll: f32,
        accel: [f32; 3],
        vel: [f32; 3],
        pos: [i32; 3],
        id: Option<i32>,
    }

    /// Dashboard state of the viewed car.
    OutGauge {
        time: u32,
        car: FixedStr<4>,
        flags: u16,
        gear: u8,
        plid: u8,
        speed: f32,
        rpm: f32,
        turbo: f32,
        eng_temp: f32,
        fuel: f32,
        oil_press: f32,
        oil_temp: f32,
        dash_lights: u32,
        show_lights: u32,
        throttle: f32,
        brake: f32,
        clutch: f32,
        display1: FixedStr<16>,
        display2: FixedStr<16>,
        id: Option<i32>,
    }
}

/// Length of the optional trailing id.
const ID_LEN: usize = 4;

pub const OUTSIM_SIZE: usize = <OutSim as Record>::SIZE;
pub const OUTGAUGE_SIZE: usize = <OutGauge as Record>::SIZE;

/// What a UDP payload of a given length carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramKind {
    OutSim,
    OutGauge,
    Packet,
}

impl DatagramKind {
    pub fn classify(len: usize) -> Self {
        match len {
            n if n == OUTSIM_SIZE || n == OUTSIM_SIZE + ID_LEN => DatagramKind::OutSim,
            n if n == OUTGAUGE_SIZE || n == OUTGAUGE_SIZE + ID_LEN => DatagramKind::OutGauge,
            _ => DatagramKind::Packet,
        }
    }
}

fn decode_exact<T: Wire + Record>(data: &[u8]) -> Result<T> {
    let mut buf = data;
    let value = T::read(&mut buf)?;
    if !buf.is_empty() {
        return Err(ProtocolError::FramingError(format!(
            "{} datagram has {} unexpected trailing bytes",
            T::NAME,
            buf.len()
        )));
    }
    Ok(value)
}

impl OutSim {
    pub fn decode(data: &[u8]) -> Result<Self> {
        decode_exact(data)
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(OUTSIM_SIZE + ID_LEN);
        self.write(&mut buf);
        buf
    }
}

impl OutGauge {
    pub fn decode(data: &[u8]) -> Result<Self> {
        decode_exact(data)
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(OUTGAUGE_SIZE + ID_LEN);
        self.write(&mut buf);
        buf
    }
}
