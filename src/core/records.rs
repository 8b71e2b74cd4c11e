//! Fixed-size sub-records embedded in packets.

use crate::core::wire::{records, FixedStr};

records! {
    /// Position and motion of one car in an MCI packet.
    CompCar {
        node: u16,
        lap: u16,
        plid: u8,
        position: u8,
        info: u8,
        sp3: u8,
        x: i32,
        y: i32,
        z: i32,
        speed: u16,
        direction: u16,
        heading: u16,
        ang_vel: i16,
    }

    /// Lap and node progress of one car in an NLP packet.
    NodeLap {
        node: u16,
        lap: u16,
        plid: u8,
        position: u8,
    }

    /// Autocross layout object.
    ObjectInfo {
        x: i16,
        y: i16,
        zbyte: u8,
        flags: u8,
        index: u8,
        heading: u8,
    }

    /// One car's state at the moment of a car-to-car contact.
    CarContact {
        plid: u8,
        info: u8,
        sp2: u8,
        steer: i8,
        thr_brk: u8,
        clu_han: u8,
        gear_sp: u8,
        speed: u8,
        direction: u8,
        heading: u8,
        accel_f: i8,
        accel_r: i8,
        x: i16,
        y: i16,
    }

    /// Reduced car state used by OBH, HLV, UCO and CSC.
    CarContObj {
        direction: u8,
        heading: u8,
        speed: u8,
        zbyte: u8,
        x: i16,
        y: i16,
    }

    CarHcp {
        h_mass: u8,
        h_tres: u8,
    }

    /// One entry of a relay host list.
    HostInfo {
        hname: FixedStr<32>,
        track: FixedStr<6>,
        flags: u8,
        num_conns: u8,
    }
}
