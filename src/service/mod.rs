//! # Service Layer
//!
//! What an application holds on to:
//! - [`Connection`]: channels, handlers and lifecycle of one host link
//! - [`EventLoop`]: drives any number of connections on one task

pub mod connection;
pub mod event_loop;

pub use connection::{Connection, ConnectionKind, ConnectionState};
pub use event_loop::{ConnectionId, EventLoop};
