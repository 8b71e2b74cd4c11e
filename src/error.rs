//! # Error Types
//!
//! Error handling for the InSim protocol core.
//!
//! This module defines every error that can surface from the codec, the
//! transport channels and the connection engine.
//!
//! ## Error Categories
//! - **I/O Errors**: socket failures reported by the operating system
//! - **Wire Errors**: framing violations, unknown packet types, truncated or
//!   oversized packets. These are fatal for the connection that produced them.
//! - **Send Errors**: sending on a closed connection, a full outbound queue or
//!   a chat message that does not fit. These are returned to the caller and
//!   leave the connection untouched.
//! - **Configuration Errors**: invalid or unreadable configuration
//!
//! ## Example Usage
//! ```rust
//! use insim_protocol::core::codec;
//! use insim_protocol::error::ProtocolError;
//!
//! // size byte of 6 is not a multiple of four
//! let err = codec::decode(&[6, 3, 0, 0, 0, 0]).unwrap_err();
//! assert!(matches!(err, ProtocolError::FramingError(_)));
//! assert!(err.is_fatal());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants for frequently built messages.
pub mod constants {
    pub const ERR_SIZE_ZERO: &str = "packet size byte is zero";
    pub const ERR_SIZE_ALIGNMENT: &str = "packet size is not a multiple of four";
    pub const ERR_NO_TCP_CHANNEL: &str = "connection has no TCP channel";
}

/// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The self-describing frame length is zero or not a multiple of four.
    #[error("Framing error: {0}")]
    FramingError(String),

    #[error("Unknown packet type: {0}")]
    UnknownPacketType(u8),

    #[error("Truncated packet: needed {needed} bytes, {available} available")]
    TruncatedPacket { needed: usize, available: usize },

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Outbound queue full (limit {limit} bytes)")]
    OutboundQueueFull { limit: usize },

    #[error("Message too long: {len} bytes (maximum {max})")]
    MessageTooLong { len: usize, max: usize },

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether the error terminates the connection it was raised on.
    ///
    /// Wire corruption and socket failures are fatal; send-side rejections and
    /// configuration problems are reported to the caller only.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::FramingError(_)
                | ProtocolError::UnknownPacketType(_)
                | ProtocolError::TruncatedPacket { .. }
                | ProtocolError::TransportError(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
