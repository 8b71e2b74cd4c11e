//! Timing defaults and async timeout helpers.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// Longest an event loop tick waits for readiness.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Idle timeout of telemetry listeners.
pub const TELEMETRY_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for a TCP connect before giving up.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Await `fut`, failing with a transport error after `duration`.
pub async fn with_timeout<F, T>(duration: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::TransportError(format!(
            "{what} timed out after {}ms",
            duration.as_millis()
        ))),
    }
}
