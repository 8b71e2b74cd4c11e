//! # Transport Channels
//!
//! Non-blocking byte movers under a [`Connection`](crate::service::connection::Connection):
//! - [`tcp::TcpChannel`]: stream framing plus a bounded outbound queue
//! - [`udp::UdpChannel`]: whole datagrams with an idle timer
//!
//! Channels never dispatch events themselves. They report readiness, bytes
//! and timer expiry; the connection decides what those mean.

pub mod tcp;
pub mod udp;

pub use tcp::{ReadStatus, TcpChannel};
pub use udp::UdpChannel;
