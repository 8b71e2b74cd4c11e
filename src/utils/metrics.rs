//! Process-wide traffic counters.
//!
//! Every connection in the process feeds the same [`Metrics`] instance.
//! Counters are relaxed atomics; a [`MetricsSnapshot`] is not a consistent
//! cut across fields.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Metrics {
    pub connections_opened: AtomicU64,
    pub connections_closed: AtomicU64,
    pub packets_sent: AtomicU64,
    pub packets_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    /// Keepalive packets echoed back to the host.
    pub keepalives_echoed: AtomicU64,
    /// OutSim and OutGauge datagrams.
    pub telemetry_received: AtomicU64,
    pub protocol_errors: AtomicU64,
    pub connection_errors: AtomicU64,
    /// UDP idle timeouts.
    pub timeouts: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            keepalives_echoed: AtomicU64::new(0),
            telemetry_received: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a packet queued for sending.
    pub fn packet_sent(&self, byte_count: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count as u64, Ordering::Relaxed);
    }

    /// Record a decoded frame or datagram.
    pub fn packet_received(&self, byte_count: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count as u64, Ordering::Relaxed);
    }

    pub fn keepalive_echoed(&self) {
        self.keepalives_echoed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn telemetry(&self, byte_count: usize) {
        self.telemetry_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count as u64, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            keepalives_echoed: self.keepalives_echoed.load(Ordering::Relaxed),
            telemetry_received: self.telemetry_received.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn log_metrics(&self) {
        let s = self.snapshot();
        info!(
            connections_opened = s.connections_opened,
            connections_closed = s.connections_closed,
            packets_sent = s.packets_sent,
            packets_received = s.packets_received,
            bytes_sent = s.bytes_sent,
            bytes_received = s.bytes_received,
            keepalives_echoed = s.keepalives_echoed,
            telemetry_received = s.telemetry_received,
            protocol_errors = s.protocol_errors,
            connection_errors = s.connection_errors,
            timeouts = s.timeouts,
            uptime_seconds = s.uptime_seconds,
            "InSim metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub keepalives_echoed: u64,
    pub telemetry_received: u64,
    pub protocol_errors: u64,
    pub connection_errors: u64,
    pub timeouts: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Logs how long a scope took when dropped.
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!(
            operation = self.operation,
            duration_us = self.start.elapsed().as_micros() as u64,
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.packet_sent(8);
        metrics.packet_sent(4);
        metrics.packet_received(12);
        metrics.telemetry(64);
        metrics.keepalive_echoed();
        metrics.timeout();

        let s = metrics.snapshot();
        assert_eq!(s.packets_sent, 2);
        assert_eq!(s.bytes_sent, 12);
        assert_eq!(s.packets_received, 1);
        assert_eq!(s.bytes_received, 76);
        assert_eq!(s.telemetry_received, 1);
        assert_eq!(s.keepalives_echoed, 1);
        assert_eq!(s.timeouts, 1);
        assert_eq!(s.protocol_errors, 0);
    }

    #[test]
    fn global_instance_is_shared() {
        let before = global_metrics().snapshot().connection_errors;
        global_metrics().connection_error();
        assert!(global_metrics().snapshot().connection_errors > before);
    }
}
