//! # Core Protocol Components
//!
//! Packet schemas, field encoding and the codec.
//!
//! ## Components
//! - **Wire**: byte representation of individual field types
//! - **Schema**: declared layouts and the two packet registries
//! - **Packet**: the generated packet structs and the [`Packet`](packet::Packet) enum
//! - **Codec**: `encode`/`decode` and the stream [`FrameCodec`](codec::FrameCodec)
//! - **Telemetry**: OutSim and OutGauge datagrams
//!
//! ## Wire Format
//! ```text
//! [Size(1)] [Type(1)] [ReqI(1)] [Body...]
//! ```
//!
//! ## Limits
//! - Packet sizes are multiples of four, at most 252 bytes
//! - Counted lists are bounded by the same limit

pub mod codec;
pub mod constants;
pub mod packet;
pub mod records;
pub mod schema;
pub mod telemetry;
pub mod wire;
