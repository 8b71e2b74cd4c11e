//! # insim-protocol
//!
//! Client side of the Live for Speed InSim protocol: the packet codec, TCP
//! and UDP transport channels, and a poll-driven dispatch engine.
//!
//! ## Layout
//! - [`core`]: packet schemas, wire encoding, codec, telemetry datagrams
//! - [`transport`]: non-blocking TCP and UDP channels
//! - [`protocol`]: event dispatcher and chat message composition
//! - [`service`]: connections and the event loop that drives them
//! - [`config`], [`error`], [`utils`]: ambient plumbing
//!
//! ## Example
//! ```no_run
//! use insim_protocol::config::ProtocolConfig;
//! use insim_protocol::core::packet::PacketType;
//! use insim_protocol::{Connection, Event, EventLoop};
//!
//! # async fn run() -> insim_protocol::Result<()> {
//! let config = ProtocolConfig::from_env()?;
//! let mut conn = Connection::insim(&config.insim, &config.engine).await?;
//! conn.bind(PacketType::Mso, |_, event: &Event<'_>| {
//!     if let Some(packet) = event.packet() {
//!         println!("{packet:?}");
//!     }
//!     Ok(())
//! });
//!
//! let mut event_loop = EventLoop::with_config(&config.engine);
//! event_loop.add(conn);
//! event_loop.run().await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::ProtocolConfig;
pub use crate::core::packet::{Packet, PacketType};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::dispatcher::{Event, EventKey, Handler};
pub use crate::service::{Connection, ConnectionId, ConnectionKind, ConnectionState, EventLoop};
