//! Protocol constants: version, sub-types and flag bits.
//!
//! Grouped in modules named after the prefix the protocol documentation uses,
//! so `TINY_NCN` is [`tiny::NCN`] and `ISF_MCI` is [`isf::MCI`].

/// InSim version sent in the ISI handshake.
pub const INSIM_VERSION: u8 = 8;

/// Most players a host can carry.
pub const MAX_PLAYERS: usize = 40;

/// Default TCP port of an InSim host.
pub const DEFAULT_INSIM_PORT: u16 = 29999;

/// Relay gateway address.
pub const RELAY_HOST: &str = "isrelay.lfs.net";
pub const RELAY_PORT: u16 = 47474;

/// Default OutSim / OutGauge UDP port.
pub const DEFAULT_TELEMETRY_PORT: u16 = 30000;

/// Command prefix that routes a message through MST.
pub const COMMAND_PREFIX: u8 = b'/';

/// IS_TINY sub-types.
pub mod tiny {
    /// Keepalive; a host sends it periodically and expects it echoed.
    pub const NONE: u8 = 0;
    pub const VER: u8 = 1;
    pub const CLOSE: u8 = 2;
    pub const PING: u8 = 3;
    pub const REPLY: u8 = 4;
    pub const VTC: u8 = 5;
    pub const SCP: u8 = 6;
    pub const SST: u8 = 7;
    pub const GTH: u8 = 8;
    pub const MPE: u8 = 9;
    pub const ISM: u8 = 10;
    pub const REN: u8 = 11;
    pub const CLR: u8 = 12;
    pub const NCN: u8 = 13;
    pub const NPL: u8 = 14;
    pub const RES: u8 = 15;
    pub const NLP: u8 = 16;
    pub const MCI: u8 = 17;
    pub const REO: u8 = 18;
    pub const RST: u8 = 19;
    pub const AXI: u8 = 20;
    pub const AXC: u8 = 21;
    pub const RIP: u8 = 22;
    pub const NCI: u8 = 23;
    pub const ALC: u8 = 24;
    pub const AXM: u8 = 25;
    pub const SLC: u8 = 26;
}

/// IS_SMALL sub-types.
pub mod small {
    pub const NONE: u8 = 0;
    pub const SSP: u8 = 1;
    pub const SSG: u8 = 2;
    pub const VTA: u8 = 3;
    pub const TMS: u8 = 4;
    pub const STP: u8 = 5;
    pub const RTP: u8 = 6;
    pub const NLI: u8 = 7;
    pub const ALC: u8 = 8;
    pub const LCS: u8 = 9;
}

/// IS_TTC sub-types.
pub mod ttc {
    pub const NONE: u8 = 0;
    pub const SEL: u8 = 1;
    pub const SEL_START: u8 = 2;
    pub const SEL_STOP: u8 = 3;
}

/// IS_ISI flags.
pub mod isf {
    pub const RES_0: u16 = 1;
    pub const RES_1: u16 = 2;
    pub const LOCAL: u16 = 4;
    pub const MSO_COLS: u16 = 8;
    pub const NLP: u16 = 16;
    pub const MCI: u16 = 32;
    pub const CON: u16 = 64;
    pub const OBH: u16 = 128;
    pub const HLV: u16 = 256;
    pub const AXM_LOAD: u16 = 512;
    pub const AXM_EDIT: u16 = 1024;
    pub const REQ_JOIN: u16 = 2048;
}

/// IS_STA state flags.
pub mod iss {
    pub const GAME: u16 = 1;
    pub const REPLAY: u16 = 2;
    pub const PAUSED: u16 = 4;
    pub const SHIFTU: u16 = 8;
    pub const DIALOG: u16 = 16;
    pub const SHIFTU_FOLLOW: u16 = 32;
    pub const SHIFTU_NO_OPT: u16 = 64;
    pub const SHOW_2D: u16 = 128;
    pub const FRONT_END: u16 = 256;
    pub const MULTI: u16 = 512;
    pub const MPSPEEDUP: u16 = 1024;
    pub const WINDOWED: u16 = 2048;
    pub const SOUND_MUTE: u16 = 4096;
    pub const VIEW_OVERRIDE: u16 = 8192;
    pub const VISIBLE: u16 = 16384;
    pub const TEXT_ENTRY: u16 = 32768;
}

/// IS_MSO user types.
pub mod mso {
    pub const SYSTEM: u8 = 0;
    pub const USER: u8 = 1;
    pub const PREFIX: u8 = 2;
    pub const O: u8 = 3;
}

/// Sounds for IS_MTC and IS_MSL.
pub mod snd {
    pub const SILENT: u8 = 0;
    pub const MESSAGE: u8 = 1;
    pub const SYSMESSAGE: u8 = 2;
    pub const INVALIDKEY: u8 = 3;
    pub const ERROR: u8 = 4;
}

pub mod vote {
    pub const NONE: u8 = 0;
    pub const END: u8 = 1;
    pub const RESTART: u8 = 2;
    pub const QUALIFY: u8 = 3;
}

/// IS_CNL leave reasons.
pub mod leavr {
    pub const DISCO: u8 = 0;
    pub const TIMEOUT: u8 = 1;
    pub const LOSTCONN: u8 = 2;
    pub const KICKED: u8 = 3;
    pub const BANNED: u8 = 4;
    pub const SECURITY: u8 = 5;
    pub const CPW: u8 = 6;
    pub const OOS: u8 = 7;
    pub const JOOS: u8 = 8;
    pub const HACK: u8 = 9;
}

/// IS_BFN sub-types.
pub mod bfn {
    pub const DEL_BTN: u8 = 0;
    pub const CLEAR: u8 = 1;
    pub const USER_CLEAR: u8 = 2;
    pub const REQUEST: u8 = 3;
}

/// IS_BTN styles.
pub mod isb {
    pub const C1: u8 = 1;
    pub const C2: u8 = 2;
    pub const C4: u8 = 4;
    pub const CLICK: u8 = 8;
    pub const LIGHT: u8 = 16;
    pub const DARK: u8 = 32;
    pub const LEFT: u8 = 64;
    pub const RIGHT: u8 = 128;
}

/// IS_CIM interface modes.
pub mod cim {
    pub const NORMAL: u8 = 0;
    pub const OPTIONS: u8 = 1;
    pub const HOST_OPTIONS: u8 = 2;
    pub const GARAGE: u8 = 3;
    pub const CAR_SELECT: u8 = 4;
    pub const TRACK_SELECT: u8 = 5;
    pub const SHIFTU: u8 = 6;
}

/// Relay host-list flags (IR_HOS).
pub mod hos {
    pub const SPECPASS: u8 = 1;
    pub const LICENSED: u8 = 2;
    pub const S1: u8 = 4;
    pub const S2: u8 = 8;
    pub const FIRST: u8 = 64;
    pub const LAST: u8 = 128;
}

/// Relay error numbers (IR_ERR).
pub mod ir_err {
    pub const PACKET: u8 = 1;
    pub const PACKET2: u8 = 2;
    pub const HOSTNAME: u8 = 3;
    pub const ADMIN: u8 = 4;
    pub const SPEC: u8 = 5;
    pub const NOSPEC: u8 = 6;
}

/// OutGauge flags.
pub mod og {
    pub const SHIFT: u16 = 1;
    pub const CTRL: u16 = 2;
    pub const TURBO: u16 = 8192;
    pub const KM: u16 = 16384;
    pub const BAR: u16 = 32768;
}

/// OutGauge dash light bits.
pub mod dl {
    pub const SHIFT: u32 = 1;
    pub const FULLBEAM: u32 = 2;
    pub const HANDBRAKE: u32 = 4;
    pub const PITSPEED: u32 = 8;
    pub const TC: u32 = 16;
    pub const SIGNAL_L: u32 = 32;
    pub const SIGNAL_R: u32 = 64;
    pub const SIGNAL_ANY: u32 = 128;
    pub const OILWARN: u32 = 256;
    pub const BATTERY: u32 = 512;
    pub const ABS: u32 = 1024;
    pub const SPARE: u32 = 2048;
}
