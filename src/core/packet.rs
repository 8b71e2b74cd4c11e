//! # Packet Definitions
//!
//! Every packet kind of the host (InSim) and relay registries.
//!
//! The [`packets!`] table below is the single source of truth: for each kind
//! it generates an immutable value struct, its [`Schema`], its body codec, a
//! [`PacketType`] variant and a [`Packet`] variant. Adding a kind is one entry
//! in the table and needs no change elsewhere.
//!
//! ## Table Syntax
//! ```text
//! Name = code { field: Type, ..., list: Vec<Record> [count = field] }
//! ```
//! A `[count = field]` list is written after its count byte; on encode the
//! count byte is filled from the list length.

use crate::core::records::{
    CarContObj, CarContact, CarHcp, CompCar, HostInfo, NodeLap, ObjectInfo,
};
use crate::core::schema::{FieldDef, FieldKind, Registry, Schema};
use crate::core::wire::{Counted, FixedStr, RawBytes, RawText, Text, Wire};
use crate::error::{ProtocolError, Result};
use bytes::{Bytes, BytesMut};
use std::fmt;

/// Body codec and schema of one packet kind.
pub trait PacketBody: Sized + Into<Packet> {
    const TYPE: PacketType;

    fn schema() -> &'static Schema;

    /// Write the body fields, the size and type bytes excluded.
    fn encode_body(&self, buf: &mut BytesMut);

    fn decode_body(buf: &mut &[u8]) -> Result<Self>;
}

macro_rules! field_kind {
    ($ty:ty, $count:ident) => {
        FieldKind::Records {
            name: <$ty as Counted>::RECORD_NAME,
            size: <$ty as Counted>::RECORD_SIZE,
            count: stringify!($count),
        }
    };
    ($ty:ty) => {
        <$ty as Wire>::KIND
    };
}

macro_rules! read_field {
    ($buf:ident, $ty:ty, $count:ident) => {
        <$ty as Counted>::read_counted($buf, usize::from($count))?
    };
    ($buf:ident, $ty:ty) => {
        <$ty as Wire>::read($buf)?
    };
}

// Each field name is rebound to its byte offset so a list can patch its
// count byte once the list has been written.
macro_rules! write_field {
    ($self:ident, $buf:ident, $field:ident, $ty:ty, $count:ident) => {
        let $field = $buf.len();
        Counted::write_all(&$self.$field, $buf);
        $buf[$count] = u8::try_from(Counted::count(&$self.$field)).unwrap_or(u8::MAX);
    };
    ($self:ident, $buf:ident, $field:ident, $ty:ty) => {
        let $field = $buf.len();
        Wire::write(&$self.$field, $buf);
    };
}

macro_rules! packets {
    ($(
        $(#[$rmeta:meta])*
        registry $registry:ident ($reg_name:literal) {
            $(
                $(#[$meta:meta])*
                $name:ident = $code:literal {
                    $( $field:ident : $ty:ty $([count = $count:ident])? ),* $(,)?
                }
            )*
        }
    )*) => {
        /// Type code of every known packet kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum PacketType {
            $( $( $name = $code, )* )*
        }

        impl PacketType {
            pub const ALL: &'static [PacketType] = &[ $( $( PacketType::$name, )* )* ];

            pub const fn code(self) -> u8 {
                self as u8
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $( $( PacketType::$name => stringify!($name), )* )*
                }
            }

            pub fn schema(self) -> &'static Schema {
                match self {
                    $( $( PacketType::$name => <$name as PacketBody>::schema(), )* )*
                }
            }

            /// A packet of this kind with every field zeroed.
            pub fn default_packet(self) -> Packet {
                match self {
                    $( $( PacketType::$name => Packet::$name($name::default()), )* )*
                }
            }
        }

        impl TryFrom<u8> for PacketType {
            type Error = ProtocolError;

            fn try_from(code: u8) -> Result<Self> {
                match code {
                    $( $( $code => Ok(PacketType::$name), )* )*
                    other => Err(ProtocolError::UnknownPacketType(other)),
                }
            }
        }

        /// A decoded, typed protocol message.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Packet {
            $( $( $name($name), )* )*
        }

        impl Packet {
            pub fn packet_type(&self) -> PacketType {
                match self {
                    $( $( Packet::$name(_) => PacketType::$name, )* )*
                }
            }

            pub(crate) fn encode_body(&self, buf: &mut BytesMut) {
                match self {
                    $( $( Packet::$name(p) => p.encode_body(buf), )* )*
                }
            }

            pub(crate) fn decode_body(packet_type: PacketType, buf: &mut &[u8]) -> Result<Self> {
                match packet_type {
                    $( $( PacketType::$name => $name::decode_body(buf).map(Packet::$name), )* )*
                }
            }
        }

        $( $(
            $(#[$meta])*
            #[derive(Debug, Clone, Default, PartialEq)]
            pub struct $name {
                $( pub $field: $ty, )*
            }

            impl PacketBody for $name {
                const TYPE: PacketType = PacketType::$name;

                fn schema() -> &'static Schema {
                    static SCHEMA: Schema = Schema {
                        packet_type: PacketType::$name,
                        name: stringify!($name),
                        fields: &[
                            $( FieldDef {
                                name: stringify!($field),
                                kind: field_kind!($ty $(, $count)?),
                            }, )*
                        ],
                    };
                    &SCHEMA
                }

                #[allow(unused_variables)]
                fn encode_body(&self, buf: &mut BytesMut) {
                    $( write_field!(self, buf, $field, $ty $(, $count)?); )*
                }

                fn decode_body(buf: &mut &[u8]) -> Result<Self> {
                    $( let $field = read_field!(buf, $ty $(, $count)?); )*
                    Ok(Self { $( $field, )* })
                }
            }

            impl From<$name> for Packet {
                fn from(packet: $name) -> Packet {
                    Packet::$name(packet)
                }
            }
        )* )*

        $(
            $(#[$rmeta])*
            pub static $registry: Registry = Registry {
                name: $reg_name,
                types: &[ $( PacketType::$name, )* ],
            };
        )*
    };
}

packets! {
    /// Host packets, codes 1-64.
    registry INSIM ("insim") {
        /// Initialise the connection; the first packet a client sends.
        Isi = 1 {
            req_i: u8,
            zero: u8,
            udp_port: u16,
            flags: u16,
            insim_ver: u8,
            prefix: u8,
            interval: u16,
            admin: FixedStr<16>,
            iname: FixedStr<16>,
        }
        /// Version reply.
        Ver = 2 {
            req_i: u8,
            zero: u8,
            version: FixedStr<8>,
            product: FixedStr<6>,
            insim_ver: u8,
            spare: u8,
        }
        /// General purpose four byte packet; sub-type `tiny::NONE` is the keepalive.
        Tiny = 3 { req_i: u8, sub_t: u8 }
        Small = 4 { req_i: u8, sub_t: u8, u_val: u32 }
        /// Host state.
        Sta = 5 {
            req_i: u8,
            zero: u8,
            replay_speed: f32,
            flags: u16,
            in_game_cam: u8,
            view_plid: u8,
            num_p: u8,
            num_conns: u8,
            num_finished: u8,
            race_in_prog: u8,
            qual_mins: u8,
            race_laps: u8,
            spare2: u8,
            spare3: u8,
            track: FixedStr<6>,
            weather: u8,
            wind: u8,
        }
        Sch = 6 { req_i: u8, zero: u8, char_b: u8, flags: u8, spare2: u8, spare3: u8 }
        Sfp = 7 { req_i: u8, zero: u8, flag: u16, off_on: u8, sp3: u8 }
        Scc = 8 { req_i: u8, zero: u8, view_plid: u8, in_game_cam: u8, sp2: u8, sp3: u8 }
        /// Camera position pack.
        Cpp = 9 {
            req_i: u8,
            zero: u8,
            pos: [i32; 3],
            h: u16,
            p: u16,
            r: u16,
            view_plid: u8,
            in_game_cam: u8,
            fov: f32,
            time: u16,
            flags: u16,
        }
        Ism = 10 { req_i: u8, zero: u8, host: u8, sp1: u8, sp2: u8, sp3: u8, hname: FixedStr<32> }
        /// Chat message out of the host.
        Mso = 11 { req_i: u8, zero: u8, ucid: u8, plid: u8, user_type: u8, text_start: u8, msg: Text }
        /// Hidden `/i` message.
        Iii = 12 { req_i: u8, zero: u8, ucid: u8, plid: u8, sp2: u8, sp3: u8, msg: Text }
        /// Type a command or short chat line.
        Mst = 13 { req_i: u8, zero: u8, msg: FixedStr<64> }
        /// Message to a connection or player.
        Mtc = 14 { req_i: u8, sound: u8, ucid: u8, plid: u8, sp2: u8, sp3: u8, text: Text }
        Mod = 15 { req_i: u8, zero: u8, bits16: i32, rr: i32, width: i32, height: i32 }
        Vtn = 16 { req_i: u8, zero: u8, ucid: u8, action: u8, spare2: u8, spare3: u8 }
        /// Race start.
        Rst = 17 {
            req_i: u8,
            zero: u8,
            race_laps: u8,
            qual_mins: u8,
            num_p: u8,
            timing: u8,
            track: FixedStr<6>,
            weather: u8,
            wind: u8,
            flags: u16,
            num_nodes: u16,
            finish: u16,
            split1: u16,
            split2: u16,
            split3: u16,
        }
        /// New connection.
        Ncn = 18 {
            req_i: u8,
            ucid: u8,
            uname: FixedStr<24>,
            pname: FixedStr<24>,
            admin: u8,
            total: u8,
            flags: u8,
            sp3: u8,
        }
        Cnl = 19 { req_i: u8, ucid: u8, reason: u8, total: u8, sp2: u8, sp3: u8 }
        Cpr = 20 { req_i: u8, ucid: u8, pname: FixedStr<24>, plate: RawBytes<8> }
        /// New player joining the race or leaving the pits.
        Npl = 21 {
            req_i: u8,
            plid: u8,
            ucid: u8,
            p_type: u8,
            flags: u16,
            pname: FixedStr<24>,
            plate: RawBytes<8>,
            cname: FixedStr<4>,
            sname: FixedStr<16>,
            tyres: [u8; 4],
            h_mass: u8,
            h_tres: u8,
            model: u8,
            pass: u8,
            spare: i32,
            set_f: u8,
            num_p: u8,
            sp2: u8,
            sp3: u8,
        }
        Plp = 22 { req_i: u8, plid: u8 }
        Pll = 23 { req_i: u8, plid: u8 }
        /// Lap time.
        Lap = 24 {
            req_i: u8,
            plid: u8,
            l_time: u32,
            e_time: u32,
            laps_done: u16,
            flags: u16,
            sp0: u8,
            penalty: u8,
            num_stops: u8,
            sp3: u8,
        }
        /// Split time.
        Spx = 25 {
            req_i: u8,
            plid: u8,
            s_time: u32,
            e_time: u32,
            split: u8,
            penalty: u8,
            num_stops: u8,
            sp3: u8,
        }
        Pit = 26 {
            req_i: u8,
            plid: u8,
            laps_done: u16,
            flags: u16,
            sp0: u8,
            penalty: u8,
            num_stops: u8,
            sp3: u8,
            tyres: [u8; 4],
            work: u32,
            spare: u32,
        }
        Psf = 27 { req_i: u8, plid: u8, s_time: u32, spare: u32 }
        Pla = 28 { req_i: u8, plid: u8, fact: u8, sp1: u8, sp2: u8, sp3: u8 }
        Cch = 29 { req_i: u8, plid: u8, camera: u8, sp1: u8, sp2: u8, sp3: u8 }
        Pen = 30 { req_i: u8, plid: u8, old_pen: u8, new_pen: u8, reason: u8, sp3: u8 }
        Toc = 31 { req_i: u8, plid: u8, old_ucid: u8, new_ucid: u8, sp2: u8, sp3: u8 }
        Flg = 32 { req_i: u8, plid: u8, off_on: u8, flag: u8, car_behind: u8, sp3: u8 }
        Pfl = 33 { req_i: u8, plid: u8, flags: u16, spare: u16 }
        /// Finished race notification, not a final result.
        Fin = 34 {
            req_i: u8,
            plid: u8,
            t_time: u32,
            b_time: u32,
            sp_a: u8,
            num_stops: u8,
            confirm: u8,
            sp_b: u8,
            laps_done: u16,
            flags: u16,
        }
        /// Confirmed result.
        Res = 35 {
            req_i: u8,
            plid: u8,
            uname: FixedStr<24>,
            pname: FixedStr<24>,
            plate: RawBytes<8>,
            cname: FixedStr<4>,
            t_time: u32,
            b_time: u32,
            sp_a: u8,
            num_stops: u8,
            confirm: u8,
            sp_b: u8,
            laps_done: u16,
            flags: u16,
            result_num: u8,
            num_res: u8,
            p_seconds: u16,
        }
        /// Grid order; `plid` holds one player id per slot.
        Reo = 36 { req_i: u8, num_p: u8, plid: RawBytes<40> }
        Nlp = 37 { req_i: u8, num_p: u8, info: Vec<NodeLap> [count = num_p] }
        /// Multi car info, up to eight cars per packet.
        Mci = 38 { req_i: u8, num_c: u8, info: Vec<CompCar> [count = num_c] }
        /// Extended chat line.
        Msx = 39 { req_i: u8, zero: u8, msg: FixedStr<96> }
        /// Local message.
        Msl = 40 { req_i: u8, sound: u8, msg: FixedStr<128> }
        Crs = 41 { req_i: u8, plid: u8 }
        Bfn = 42 { req_i: u8, sub_t: u8, ucid: u8, click_id: u8, max_click: u8, inst: u8 }
        Axi = 43 { req_i: u8, zero: u8, ax_start: u8, num_cp: u8, num_o: u16, lname: FixedStr<32> }
        Axo = 44 { req_i: u8, plid: u8 }
        /// Button; its text is padded but not terminated.
        Btn = 45 {
            req_i: u8,
            ucid: u8,
            click_id: u8,
            inst: u8,
            b_style: u8,
            type_in: u8,
            l: u8,
            t: u8,
            w: u8,
            h: u8,
            text: RawText,
        }
        Btc = 46 { req_i: u8, ucid: u8, click_id: u8, inst: u8, c_flags: u8, sp3: u8 }
        Btt = 47 {
            req_i: u8,
            ucid: u8,
            click_id: u8,
            inst: u8,
            type_in: u8,
            sp3: u8,
            text: FixedStr<96>,
        }
        /// Replay information.
        Rip = 48 {
            req_i: u8,
            error: u8,
            mpr: u8,
            paused: u8,
            options: u8,
            sp3: u8,
            c_time: u16,
            t_time: u16,
            rname: FixedStr<64>,
        }
        Ssh = 49 { req_i: u8, error: u8, sp0: u8, sp1: u8, sp2: u8, sp3: u8, bmp: FixedStr<32> }
        /// Car-to-car contact.
        Con = 50 { req_i: u8, zero: u8, sp_close: u16, time: u16, a: CarContact, b: CarContact }
        /// Car hit an object.
        Obh = 51 {
            req_i: u8,
            plid: u8,
            sp_close: u16,
            time: u16,
            c: CarContObj,
            x: i16,
            y: i16,
            zbyte: u8,
            sp1: u8,
            index: u8,
            obh_flags: u8,
        }
        Hlv = 52 { req_i: u8, plid: u8, hlvc: u8, sp1: u8, time: u16, c: CarContObj }
        Plc = 53 { req_i: u8, zero: u8, ucid: u8, sp1: u8, sp2: u8, sp3: u8, cars: u32 }
        /// Autocross objects added or removed.
        Axm = 54 {
            req_i: u8,
            num_o: u8,
            ucid: u8,
            pmo_action: u8,
            pmo_flags: u8,
            sp3: u8,
            info: Vec<ObjectInfo> [count = num_o],
        }
        /// Admin command report.
        Acr = 55 { req_i: u8, zero: u8, ucid: u8, admin: u8, result: u8, sp3: u8, text: Text }
        /// Handicaps for all 32 cars.
        Hcp = 56 { req_i: u8, zero: u8, info: [CarHcp; 32] }
        /// Connection info, only sent to a host's own InSim.
        Nci = 57 {
            req_i: u8,
            ucid: u8,
            language: u8,
            sp1: u8,
            sp2: u8,
            sp3: u8,
            user_id: u32,
            ip_address: u32,
        }
        /// Join request reply.
        Jrr = 58 {
            req_i: u8,
            plid: u8,
            ucid: u8,
            jrr_action: u8,
            sp2: u8,
            sp3: u8,
            start_pos: ObjectInfo,
        }
        /// User control object crossed.
        Uco = 59 {
            req_i: u8,
            plid: u8,
            sp0: u8,
            uco_action: u8,
            sp2: u8,
            sp3: u8,
            time: u32,
            c: CarContObj,
            info: ObjectInfo,
        }
        Oco = 60 { req_i: u8, zero: u8, oco_action: u8, index: u8, identifier: u8, data: u8 }
        /// Target-to-connection request.
        Ttc = 61 { req_i: u8, sub_t: u8, ucid: u8, b1: u8, b2: u8, b3: u8 }
        /// Selected car.
        Slc = 62 { req_i: u8, ucid: u8, cname: FixedStr<4> }
        /// Car state changed.
        Csc = 63 {
            req_i: u8,
            plid: u8,
            sp0: u8,
            csc_action: u8,
            sp2: u8,
            sp3: u8,
            time: u32,
            c: CarContObj,
        }
        /// Connection interface mode.
        Cim = 64 { req_i: u8, ucid: u8, mode: u8, sub_mode: u8, sel_type: u8, sp3: u8 }
    }

    /// Relay gateway packets, codes 250-255.
    registry RELAY ("relay") {
        /// Admin request.
        Arq = 250 { req_i: u8, sp0: u8 }
        /// Admin response; `admin` is non-zero when the password matched.
        Arp = 251 { req_i: u8, admin: u8 }
        /// Host list request.
        Hlr = 252 { req_i: u8, sp0: u8 }
        /// Host list, delivered over several packets.
        Hos = 253 { req_i: u8, num_hosts: u8, info: Vec<HostInfo> [count = num_hosts] }
        /// Select a host to relay.
        Sel = 254 {
            req_i: u8,
            zero: u8,
            hname: FixedStr<32>,
            admin: FixedStr<16>,
            spec: FixedStr<16>,
        }
        RelayError = 255 { req_i: u8, err_no: u8 }
    }
}

impl Packet {
    pub fn schema(&self) -> &'static Schema {
        self.packet_type().schema()
    }

    /// Encode into a standalone buffer.
    pub fn encode(&self) -> Result<Bytes> {
        crate::core::codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        crate::core::codec::decode(bytes)
    }

    /// Whether this is the host's keepalive, which must be echoed unchanged.
    pub fn is_keepalive(&self) -> bool {
        matches!(self, Packet::Tiny(tiny) if tiny.sub_t == crate::core::constants::tiny::NONE)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

impl Tiny {
    pub fn new(req_i: u8, sub_t: u8) -> Self {
        Self { req_i, sub_t }
    }
}

impl Small {
    pub fn new(req_i: u8, sub_t: u8, u_val: u32) -> Self {
        Self { req_i, sub_t, u_val }
    }
}

impl Mci {
    /// Build an MCI with a consistent car count.
    pub fn new(req_i: u8, info: Vec<CompCar>) -> Self {
        Self {
            req_i,
            num_c: u8::try_from(info.len()).unwrap_or(u8::MAX),
            info,
        }
    }
}

impl Nlp {
    pub fn new(req_i: u8, info: Vec<NodeLap>) -> Self {
        Self {
            req_i,
            num_p: u8::try_from(info.len()).unwrap_or(u8::MAX),
            info,
        }
    }
}

impl Hos {
    pub fn new(req_i: u8, info: Vec<HostInfo>) -> Self {
        Self {
            req_i,
            num_hosts: u8::try_from(info.len()).unwrap_or(u8::MAX),
            info,
        }
    }
}
