//! # Protocol Layer
//!
//! Event routing and message composition on top of the packet codec.

pub mod dispatcher;
pub mod message;
