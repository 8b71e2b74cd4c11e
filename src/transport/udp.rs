//! UDP datagram channel with idle timeout.
//!
//! Each datagram is one unit; there is no reassembly. The idle timer is
//! armed the first time it is polled and pushed forward by every datagram.
//! Once it fires the channel reports it exactly once and stops reading.

use crate::error::{ProtocolError, Result};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

#[derive(Debug)]
pub struct UdpChannel {
    socket: Option<UdpSocket>,
    timeout: Duration,
    deadline: Option<Instant>,
    buf: Vec<u8>,
    timed_out: bool,
}

impl UdpChannel {
    /// Bind a socket. A zero `timeout` disables the idle timer.
    #[instrument(skip(addr))]
    pub async fn bind(addr: impl ToSocketAddrs, timeout: Duration, buf_size: usize) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket, timeout, buf_size))
    }

    pub fn from_socket(socket: UdpSocket, timeout: Duration, buf_size: usize) -> Self {
        if let Ok(local) = socket.local_addr() {
            debug!(%local, timeout_ms = timeout.as_millis() as u64, "UDP channel bound");
        }
        Self {
            socket: Some(socket),
            timeout,
            deadline: None,
            buf: vec![0; buf_size],
            timed_out: false,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_timed_out(&self) -> bool {
        self.timed_out
    }

    /// Wait for a datagram or the idle deadline, whichever comes first.
    /// Resolves at once while the timer is still unarmed.
    ///
    /// Never resolves once closed or timed out.
    pub async fn ready(&self) -> io::Result<()> {
        let Some(socket) = self.socket.as_ref().filter(|_| !self.timed_out) else {
            return std::future::pending().await;
        };
        match self.deadline {
            // unarmed timer: the next poll_timeout arms it
            None if !self.timeout.is_zero() => Ok(()),
            Some(deadline) => {
                tokio::select! {
                    res = socket.readable() => res,
                    _ = tokio::time::sleep_until(deadline) => Ok(()),
                }
            }
            None => socket.readable().await,
        }
    }

    /// Check the idle timer. Returns `true` once, when it first expires.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        if self.timed_out || self.timeout.is_zero() || self.socket.is_none() {
            return false;
        }
        match self.deadline {
            None => {
                self.deadline = Some(now + self.timeout);
                false
            }
            Some(deadline) if now >= deadline => {
                trace!(timeout_ms = self.timeout.as_millis() as u64, "UDP idle timeout");
                self.timed_out = true;
                true
            }
            Some(_) => false,
        }
    }

    /// Take one datagram if one is waiting.
    ///
    /// The payload length must be a multiple of 4.
    pub fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(socket) = self.socket.as_ref() else {
            return Err(ProtocolError::ConnectionClosed);
        };
        if self.timed_out {
            return Ok(None);
        }
        let len = loop {
            match socket.try_recv(&mut self.buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if self.deadline.is_some() {
            self.deadline = Some(Instant::now() + self.timeout);
        }
        if len % 4 != 0 {
            return Err(ProtocolError::FramingError(format!(
                "datagram length {len} is not a multiple of 4"
            )));
        }
        Ok(Some(self.buf[..len].to_vec()))
    }

    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            self.deadline = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn channel(timeout: Duration) -> (UdpChannel, UdpSocket) {
        let channel = UdpChannel::bind("127.0.0.1:0", timeout, 512).await.unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.connect(channel.local_addr().unwrap()).await.unwrap();
        (channel, sender)
    }

    async fn recv_one(channel: &mut UdpChannel) -> Result<Vec<u8>> {
        loop {
            channel.ready().await?;
            if let Some(data) = channel.recv()? {
                return Ok(data);
            }
        }
    }

    #[tokio::test]
    async fn datagrams_are_delivered_whole() {
        let (mut channel, sender) = channel(Duration::ZERO).await;
        sender.send(&[0u8; 64]).await.unwrap();
        assert_eq!(recv_one(&mut channel).await.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn unaligned_datagram_is_framing_error() {
        let (mut channel, sender) = channel(Duration::ZERO).await;
        sender.send(&[0u8; 6]).await.unwrap();
        assert!(matches!(
            recv_one(&mut channel).await,
            Err(ProtocolError::FramingError(_))
        ));
    }

    #[tokio::test]
    async fn timeout_arms_on_first_poll_and_fires_once() {
        let (mut channel, _sender) = channel(Duration::from_secs(5)).await;
        let start = Instant::now();
        assert!(!channel.poll_timeout(start));
        assert!(!channel.poll_timeout(start + Duration::from_secs(4)));
        assert!(channel.poll_timeout(start + Duration::from_secs(5)));
        assert!(!channel.poll_timeout(start + Duration::from_secs(60)));
        assert!(channel.has_timed_out());
    }

    #[tokio::test]
    async fn zero_timeout_never_fires() {
        let (mut channel, _sender) = channel(Duration::ZERO).await;
        let start = Instant::now();
        assert!(!channel.poll_timeout(start));
        assert!(!channel.poll_timeout(start + Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn datagram_resets_deadline() {
        let (mut channel, sender) = channel(Duration::from_secs(1)).await;
        let start = Instant::now();
        channel.poll_timeout(start);
        sender.send(&[0u8; 4]).await.unwrap();
        recv_one(&mut channel).await.unwrap();
        let received_at = Instant::now();
        assert!(!channel.poll_timeout(start + Duration::from_millis(999)));
        assert!(channel.poll_timeout(received_at + Duration::from_secs(1)));
    }
}
