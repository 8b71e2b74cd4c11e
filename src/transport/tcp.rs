//! TCP control channel.
//!
//! Buffers whatever the socket yields and hands out complete frames in
//! arrival order. Outbound packets are queued and written as the socket
//! accepts them; a partial write keeps the remainder for the next flush.
//!
//! All I/O here is non-blocking (`try_read`/`try_write`). Waiting for
//! readiness is the caller's job via [`TcpChannel::ready`].

use crate::core::codec::{encode_into, FrameCodec};
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use bytes::{Buf, Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use tokio::io::Interest;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Decoder;
use tracing::{debug, instrument, trace};

/// Outcome of draining the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Socket still open; `usize` bytes were read.
    Open(usize),
    /// Peer closed its side after the bytes already buffered.
    Eof,
}

#[derive(Debug)]
pub struct TcpChannel {
    stream: Option<TcpStream>,
    peer: SocketAddr,
    codec: FrameCodec,
    inbound: BytesMut,
    outbound: BytesMut,
    read_chunk: usize,
    max_outbound: usize,
}

impl TcpChannel {
    #[instrument(skip(addr))]
    pub async fn connect(
        addr: impl ToSocketAddrs,
        read_chunk: usize,
        max_outbound: usize,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_stream(stream, read_chunk, max_outbound)
    }

    pub fn from_stream(stream: TcpStream, read_chunk: usize, max_outbound: usize) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        debug!(%peer, "TCP channel open");
        Ok(Self {
            stream: Some(stream),
            peer,
            codec: FrameCodec,
            inbound: BytesMut::with_capacity(read_chunk),
            outbound: BytesMut::new(),
            read_chunk,
            max_outbound,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Whether queued bytes are waiting for the socket.
    pub fn is_writable(&self) -> bool {
        !self.outbound.is_empty()
    }

    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }

    /// Wait until the socket can be read, or written while data is queued.
    ///
    /// Never resolves once the channel is closed.
    pub async fn ready(&self) -> io::Result<()> {
        let Some(stream) = self.stream.as_ref() else {
            return std::future::pending().await;
        };
        let interest = if self.is_writable() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        stream.ready(interest).await.map(|_| ())
    }

    /// Read everything the socket has without blocking.
    pub fn read_available(&mut self) -> Result<ReadStatus> {
        let Some(stream) = self.stream.as_ref() else {
            return Err(ProtocolError::ConnectionClosed);
        };
        let mut total = 0;
        loop {
            self.inbound.reserve(self.read_chunk);
            match stream.try_read_buf(&mut self.inbound) {
                Ok(0) => return Ok(ReadStatus::Eof),
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    trace!(bytes = total, "drained TCP socket");
                    return Ok(ReadStatus::Open(total));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Slice the next complete frame off the inbound buffer.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        self.codec.decode(&mut self.inbound)
    }

    /// Whether `next_frame` has something to report without reading.
    pub fn has_frame(&self) -> bool {
        match self.inbound.first() {
            Some(&size) => size == 0 || self.inbound.len() >= usize::from(size),
            None => false,
        }
    }

    /// Bytes received but not yet framed.
    pub fn buffered(&self) -> usize {
        self.inbound.len()
    }

    /// Append bytes to the outbound queue.
    pub fn queue(&mut self, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        if self.outbound.len() + bytes.len() > self.max_outbound {
            return Err(ProtocolError::OutboundQueueFull {
                limit: self.max_outbound,
            });
        }
        self.outbound.extend_from_slice(bytes);
        Ok(())
    }

    /// Encode `packet` onto the outbound queue.
    pub fn queue_packet(&mut self, packet: &Packet) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let start = self.outbound.len();
        encode_into(packet, &mut self.outbound)?;
        if self.outbound.len() > self.max_outbound {
            self.outbound.truncate(start);
            return Err(ProtocolError::OutboundQueueFull {
                limit: self.max_outbound,
            });
        }
        Ok(())
    }

    /// Write as much of the queue as the socket takes right now.
    pub fn flush(&mut self) -> Result<usize> {
        let Some(stream) = self.stream.as_ref() else {
            return Ok(0);
        };
        let mut written = 0;
        while !self.outbound.is_empty() {
            match stream.try_write(&self.outbound) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => {
                    self.outbound.advance(n);
                    written += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if written > 0 {
            trace!(bytes = written, remaining = self.outbound.len(), "flushed TCP queue");
        }
        Ok(written)
    }

    /// Drop the socket. Unsent bytes are discarded.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            if !self.outbound.is_empty() {
                debug!(peer = %self.peer, dropped = self.outbound.len(), "closing with unsent bytes");
            }
            self.outbound.clear();
            self.inbound.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::Tiny;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn pair(max_outbound: usize) -> (TcpChannel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (channel, accepted) = tokio::join!(
            TcpChannel::connect(addr, 2048, max_outbound),
            listener.accept()
        );
        (channel.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn frames_split_across_reads() {
        let (mut channel, mut peer) = pair(1024).await;

        peer.write_all(&[8, 4, 1]).await.unwrap();
        channel.ready().await.unwrap();
        while channel.buffered() < 3 {
            channel.read_available().unwrap();
            tokio::task::yield_now().await;
        }
        assert!(channel.next_frame().unwrap().is_none());

        peer.write_all(&[0, 9, 0, 0, 0, 4, 3, 0, 0]).await.unwrap();
        while channel.buffered() < 12 {
            channel.ready().await.unwrap();
            channel.read_available().unwrap();
        }
        assert_eq!(&channel.next_frame().unwrap().unwrap()[..], &[8, 4, 1, 0, 9, 0, 0, 0]);
        assert_eq!(&channel.next_frame().unwrap().unwrap()[..], &[4, 3, 0, 0]);
        assert!(channel.next_frame().unwrap().is_none());
    }

    #[tokio::test]
    async fn queued_packets_reach_peer() {
        let (mut channel, mut peer) = pair(1024).await;
        channel.queue_packet(&Tiny::new(7, 3).into()).unwrap();
        channel.queue(&[4, 3, 8, 0]).unwrap();
        assert!(channel.is_writable());

        while channel.is_writable() {
            channel.ready().await.unwrap();
            channel.flush().unwrap();
        }

        let mut buf = [0u8; 8];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [4, 3, 7, 3, 4, 3, 8, 0]);
    }

    #[tokio::test]
    async fn outbound_queue_is_capped() {
        let (mut channel, _peer) = pair(8).await;
        channel.queue(&[0; 8]).unwrap();
        assert!(matches!(
            channel.queue(&[0; 4]),
            Err(ProtocolError::OutboundQueueFull { limit: 8 })
        ));
        assert!(matches!(
            channel.queue_packet(&Tiny::default().into()),
            Err(ProtocolError::OutboundQueueFull { .. })
        ));
        assert_eq!(channel.pending_outbound(), 8);
    }

    #[tokio::test]
    async fn eof_is_reported() {
        let (mut channel, peer) = pair(64).await;
        drop(peer);
        loop {
            channel.ready().await.unwrap();
            if channel.read_available().unwrap() == ReadStatus::Eof {
                break;
            }
        }
    }

    #[tokio::test]
    async fn closed_channel_rejects_queue() {
        let (mut channel, _peer) = pair(64).await;
        channel.close();
        assert!(channel.is_closed());
        assert!(matches!(
            channel.queue(&[4, 3, 0, 0]),
            Err(ProtocolError::ConnectionClosed)
        ));
    }
}
