//! # Connection
//!
//! A TCP control channel and/or a UDP channel, the handlers bound to them
//! and the lifecycle state machine:
//!
//! ```text
//! Connecting --(first process)--> Connected --(close | error | timeout)--> Closed
//! ```
//!
//! Leaving for `Closed` fires exactly one of `Close`, `Error` or `Timeout`.
//! A closed connection is inert: sends fail with
//! [`ProtocolError::ConnectionClosed`] and `process` does nothing.
//!
//! ## Handler failures
//! An `Err` returned by a handler is not caught. It stops the current
//! `process` call and is returned to whoever drives the connection. Frames
//! already buffered stay buffered and are handled on the next call.
//!
//! ## Keepalive
//! A TINY packet with sub-type NONE received over TCP is queued back to the
//! host byte for byte before any handler sees it.

use crate::config::{EngineConfig, InSimConfig, RelayConfig, TelemetryConfig};
use crate::core::codec;
use crate::core::constants::INSIM_VERSION;
use crate::core::packet::{Isi, Packet, Sel};
use crate::core::telemetry::{DatagramKind, OutGauge, OutSim};
use crate::core::wire::FixedStr;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::{Dispatcher, Event, EventKey, Handler};
use crate::protocol::message;
use crate::transport::{ReadStatus, TcpChannel, UdpChannel};
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::with_timeout;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Direct InSim host, TCP plus optional UDP.
    InSim,
    /// Relay gateway over TCP.
    Relay,
    /// OutSim listener, UDP only.
    OutSim,
    /// OutGauge listener, UDP only.
    OutGauge,
}

impl ConnectionKind {
    pub fn is_telemetry(self) -> bool {
        matches!(self, ConnectionKind::OutSim | ConnectionKind::OutGauge)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct Connection {
    name: String,
    kind: ConnectionKind,
    state: ConnectionState,
    tcp: Option<TcpChannel>,
    udp: Option<UdpChannel>,
    dispatcher: Dispatcher,
}

impl Connection {
    /// Connect to an InSim host and queue the ISI handshake.
    ///
    /// A UDP channel is bound on `udp_bind:udp_port` when `udp_port` is set;
    /// the host then sends MCI/NLP there.
    #[instrument(skip_all, fields(name = %config.name, address = %config.address()))]
    pub async fn insim(config: &InSimConfig, engine: &EngineConfig) -> Result<Self> {
        let tcp = with_timeout(
            engine.connect_timeout,
            "InSim connect",
            TcpChannel::connect(config.address(), engine.tcp_read_size, engine.max_outbound_bytes),
        )
        .await?;

        let udp = if config.udp_port != 0 {
            let bind = format!("{}:{}", config.udp_bind, config.udp_port);
            Some(UdpChannel::bind(bind, Duration::ZERO, engine.udp_buffer_size).await?)
        } else {
            None
        };

        let mut conn = Self::from_channels(&config.name, ConnectionKind::InSim, Some(tcp), udp);
        conn.send(Isi {
            req_i: config.req_i,
            udp_port: config.udp_port,
            flags: config.flags,
            insim_ver: INSIM_VERSION,
            prefix: config
                .prefix
                .filter(char::is_ascii)
                .map_or(0, |c| c as u8),
            interval: config.interval,
            admin: FixedStr::from(config.admin.as_str()),
            iname: FixedStr::from(config.iname.as_str()),
            ..Default::default()
        })?;
        Ok(conn)
    }

    /// Connect to the relay gateway, selecting `hname` when configured.
    #[instrument(skip_all, fields(name = %config.name, address = %config.address()))]
    pub async fn relay(config: &RelayConfig, engine: &EngineConfig) -> Result<Self> {
        let tcp = with_timeout(
            engine.connect_timeout,
            "relay connect",
            TcpChannel::connect(config.address(), engine.tcp_read_size, engine.max_outbound_bytes),
        )
        .await?;

        let mut conn = Self::from_channels(&config.name, ConnectionKind::Relay, Some(tcp), None);
        if let Some(hname) = &config.hname {
            conn.send(Sel {
                req_i: config.req_i,
                hname: FixedStr::from(hname.as_str()),
                admin: FixedStr::from(config.admin.as_str()),
                spec: FixedStr::from(config.spec.as_str()),
                ..Default::default()
            })?;
        }
        Ok(conn)
    }

    /// Listen for OutSim datagrams.
    pub async fn outsim(config: &TelemetryConfig, engine: &EngineConfig) -> Result<Self> {
        Self::telemetry(ConnectionKind::OutSim, config, engine).await
    }

    /// Listen for OutGauge datagrams.
    pub async fn outgauge(config: &TelemetryConfig, engine: &EngineConfig) -> Result<Self> {
        Self::telemetry(ConnectionKind::OutGauge, config, engine).await
    }

    #[instrument(skip(config, engine), fields(name = %config.name, address = %config.address()))]
    async fn telemetry(
        kind: ConnectionKind,
        config: &TelemetryConfig,
        engine: &EngineConfig,
    ) -> Result<Self> {
        let udp = UdpChannel::bind(config.address(), config.timeout, engine.udp_buffer_size).await?;
        Ok(Self::from_channels(&config.name, kind, None, Some(udp)))
    }

    /// Assemble a connection from channels that are already open.
    ///
    /// With a TCP channel the connection starts `Connecting` and fires
    /// `Init` on its first `process`. Without one it starts `Connected`.
    pub fn from_channels(
        name: &str,
        kind: ConnectionKind,
        tcp: Option<TcpChannel>,
        udp: Option<UdpChannel>,
    ) -> Self {
        let state = if tcp.is_some() {
            ConnectionState::Connecting
        } else {
            ConnectionState::Connected
        };
        global_metrics().connection_opened();
        info!(connection = %name, ?kind, %state, "connection opened");
        Self {
            name: name.to_string(),
            kind,
            state,
            tcp,
            udp,
            dispatcher: Dispatcher::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.tcp.as_ref().map(TcpChannel::peer_addr)
    }

    pub fn udp_local_addr(&self) -> Option<SocketAddr> {
        self.udp.as_ref().and_then(UdpChannel::local_addr)
    }

    /// Bytes queued on the TCP channel and not yet written.
    pub fn pending_outbound(&self) -> usize {
        self.tcp.as_ref().map_or(0, TcpChannel::pending_outbound)
    }

    // ---- handlers ----

    pub fn bind<F>(&mut self, key: impl Into<EventKey>, handler: F) -> Handler
    where
        F: Fn(&mut Connection, &Event<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.dispatcher.bind(key, handler)
    }

    pub fn bind_handler(&mut self, key: impl Into<EventKey>, handler: Handler) {
        self.dispatcher.bind_handler(key, handler);
    }

    pub fn unbind(&mut self, key: impl Into<EventKey>, handler: &Handler) -> bool {
        self.dispatcher.unbind(key, handler)
    }

    pub fn is_bound(&self, key: impl Into<EventKey>, handler: &Handler) -> bool {
        self.dispatcher.is_bound(key, handler)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    fn dispatch(&mut self, event: &Event<'_>) -> Result<()> {
        for handler in self.dispatcher.route(event) {
            handler(self, event)?;
        }
        Ok(())
    }

    // ---- sending ----

    /// Encode and queue `packet` on the TCP channel.
    ///
    /// Returns the packet as the host will decode it, so truncated strings
    /// and patched counts are visible to the caller.
    pub fn send(&mut self, packet: impl Into<Packet>) -> Result<Packet> {
        let packet = packet.into();
        let bytes = codec::encode(&packet)?;
        self.send_raw(&bytes)?;
        debug!(connection = %self.name, packet = %packet.packet_type(), size = bytes.len(), "packet queued");
        codec::decode(&bytes)
    }

    /// Queue pre-encoded bytes without inspecting them.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let tcp = self.tcp.as_mut().ok_or_else(|| {
            ProtocolError::TransportError(constants::ERR_NO_TCP_CHANNEL.to_string())
        })?;
        tcp.queue(bytes)?;
        global_metrics().packet_sent(bytes.len());
        Ok(())
    }

    /// Queue several packets in order, stopping at the first failure.
    pub fn send_all<I, P>(&mut self, packets: I) -> Result<Vec<Packet>>
    where
        I: IntoIterator<Item = P>,
        P: Into<Packet>,
    {
        packets.into_iter().map(|p| self.send(p)).collect()
    }

    /// Send a chat line or command to the host.
    ///
    /// Text longer than an MSX holds is cut to its first 95 bytes without
    /// an error. Use [`send_message_checked`](Self::send_message_checked)
    /// to refuse it instead.
    pub fn send_message(&mut self, msg: impl AsRef<[u8]>) -> Result<Packet> {
        self.send(message::compose(msg.as_ref()))
    }

    pub fn send_message_checked(&mut self, msg: impl AsRef<[u8]>) -> Result<Packet> {
        let packet = message::compose_checked(msg.as_ref())?;
        self.send(packet)
    }

    /// Show a message to one connection or player via MTC.
    pub fn send_message_to(&mut self, msg: impl AsRef<[u8]>, ucid: u8, plid: u8) -> Result<Packet> {
        self.send(message::compose_to(msg.as_ref(), ucid, plid))
    }

    // ---- lifecycle ----

    /// Close both channels and fire `Close`. Does nothing if already closed.
    ///
    /// Bytes still queued for the host are dropped.
    pub fn close(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.shutdown();
        info!(connection = %self.name, "connection closed");
        self.dispatch(&Event::Close)
    }

    fn shutdown(&mut self) {
        if let Some(tcp) = self.tcp.as_mut() {
            tcp.close();
        }
        if let Some(udp) = self.udp.as_mut() {
            udp.close();
        }
        self.state = ConnectionState::Closed;
        global_metrics().connection_closed();
    }

    fn fail(&mut self, err: ProtocolError) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        error!(connection = %self.name, error = %err, "connection failed");
        match err {
            ProtocolError::Io(_) | ProtocolError::TransportError(_) => {
                global_metrics().connection_error()
            }
            _ => global_metrics().protocol_error(),
        }
        self.shutdown();
        self.dispatch(&Event::Error(&err))
    }

    fn time_out(&mut self) -> Result<()> {
        let after = self.udp.as_ref().map_or(Duration::ZERO, UdpChannel::timeout);
        warn!(connection = %self.name, timeout_ms = after.as_millis() as u64, "no datagram within timeout");
        global_metrics().timeout();
        self.shutdown();
        self.dispatch(&Event::Timeout)
    }

    // ---- I/O ----

    /// Resolve when [`process`](Self::process) has work to do, including
    /// frames left buffered by a failed handler.
    ///
    /// Pending forever once closed.
    pub async fn ready(&self) -> Result<()> {
        if self.is_closed() {
            return std::future::pending().await;
        }
        if self.state == ConnectionState::Connecting
            || self.tcp.as_ref().is_some_and(TcpChannel::has_frame)
        {
            return Ok(());
        }
        let tcp = async {
            match &self.tcp {
                Some(tcp) => tcp.ready().await,
                None => std::future::pending().await,
            }
        };
        let udp = async {
            match &self.udp {
                Some(udp) => udp.ready().await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            res = tcp => res?,
            res = udp => res?,
        }
        Ok(())
    }

    /// Service both channels once without blocking.
    ///
    /// Fires `Init` on the first call for TCP connections, then reads and
    /// dispatches every complete frame and datagram available, and writes
    /// as much of the outbound queue as the socket accepts.
    pub fn process(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
            info!(connection = %self.name, "connected");
            self.dispatch(&Event::Init)?;
        }
        self.process_tcp()?;
        self.process_udp()
    }

    fn process_tcp(&mut self) -> Result<()> {
        let status = match self.tcp.as_mut() {
            Some(tcp) if !tcp.is_closed() => tcp.read_available(),
            _ => return Ok(()),
        };
        let status = match status {
            Ok(status) => status,
            Err(e) => return self.fail(e),
        };

        loop {
            if self.is_closed() {
                return Ok(());
            }
            let Some(tcp) = self.tcp.as_mut() else {
                return Ok(());
            };
            let frame = match tcp.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => return self.fail(e),
            };
            let packet = match codec::decode(&frame) {
                Ok(packet) => packet,
                Err(e) => return self.fail(e),
            };
            global_metrics().packet_received(frame.len());
            debug!(connection = %self.name, packet = %packet.packet_type(), size = frame.len(), "packet received");

            if packet.is_keepalive() {
                if let Err(e) = tcp.queue(&frame) {
                    return self.fail(e);
                }
                global_metrics().keepalive_echoed();
            }
            self.dispatch(&Event::Packet(&packet))?;
        }

        if status == ReadStatus::Eof {
            info!(connection = %self.name, "host closed the connection");
            return self.close();
        }

        let flushed = match self.tcp.as_mut() {
            Some(tcp) => tcp.flush(),
            None => Ok(0),
        };
        match flushed {
            Ok(_) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    fn process_udp(&mut self) -> Result<()> {
        let timed_out = match self.udp.as_mut() {
            Some(udp) if !udp.is_closed() => udp.poll_timeout(Instant::now()),
            _ => return Ok(()),
        };
        if timed_out {
            return self.time_out();
        }

        loop {
            if self.is_closed() {
                return Ok(());
            }
            let Some(udp) = self.udp.as_mut() else {
                return Ok(());
            };
            let data = match udp.recv() {
                Ok(Some(data)) => data,
                Ok(None) => return Ok(()),
                Err(e) => return self.fail(e),
            };
            self.route_datagram(&data)?;
        }
    }

    fn route_datagram(&mut self, data: &[u8]) -> Result<()> {
        match DatagramKind::classify(data.len()) {
            DatagramKind::OutSim => match OutSim::decode(data) {
                Ok(sim) => {
                    global_metrics().telemetry(data.len());
                    self.dispatch(&Event::OutSim(&sim))
                }
                Err(e) => self.fail(e),
            },
            DatagramKind::OutGauge => match OutGauge::decode(data) {
                Ok(gauge) => {
                    global_metrics().telemetry(data.len());
                    self.dispatch(&Event::OutGauge(&gauge))
                }
                Err(e) => self.fail(e),
            },
            DatagramKind::Packet if self.kind.is_telemetry() => {
                debug!(connection = %self.name, size = data.len(), "ignoring datagram of unknown size");
                Ok(())
            }
            DatagramKind::Packet => match codec::decode(data) {
                Ok(packet) => {
                    global_metrics().packet_received(data.len());
                    self.dispatch(&Event::Packet(&packet))
                }
                Err(e) => self.fail(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{PacketType, Tiny};
    use std::sync::{Arc, Mutex};
    use tokio::net::{TcpListener, TcpStream};

    async fn tcp_pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tcp, accepted) = tokio::join!(TcpChannel::connect(addr, 2048, 4096), listener.accept());
        let conn = Connection::from_channels("test", ConnectionKind::InSim, Some(tcp.unwrap()), None);
        (conn, accepted.unwrap().0)
    }

    #[tokio::test]
    async fn init_fires_on_first_process_only() {
        let (mut conn, _host) = tcp_pair().await;
        let count = Arc::new(Mutex::new(0));
        let seen = count.clone();
        conn.bind(EventKey::Init, move |_, _| {
            *seen.lock().unwrap() += 1;
            Ok(())
        });

        assert_eq!(conn.state(), ConnectionState::Connecting);
        conn.ready().await.unwrap();
        conn.process().unwrap();
        conn.process().unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut conn, _host) = tcp_pair().await;
        let count = Arc::new(Mutex::new(0));
        let seen = count.clone();
        conn.bind(EventKey::Close, move |_, _| {
            *seen.lock().unwrap() += 1;
            Ok(())
        });

        conn.close().unwrap();
        conn.close().unwrap();
        assert!(conn.is_closed());
        assert_eq!(*count.lock().unwrap(), 1);
        assert!(matches!(
            conn.send(Tiny::default()),
            Err(ProtocolError::ConnectionClosed)
        ));
        assert!(conn.process().is_ok());
    }

    #[tokio::test]
    async fn send_returns_packet_as_encoded() {
        let (mut conn, _host) = tcp_pair().await;
        let sent = conn.send_message(vec![b'a'; 120]).unwrap();
        match sent {
            Packet::Msx(msx) => assert_eq!(msx.msg.len(), 95),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(conn.pending_outbound(), 100);
    }

    #[tokio::test]
    async fn send_all_queues_in_order() {
        let (mut conn, _host) = tcp_pair().await;
        let sent = conn
            .send_all([Tiny::new(1, 3), Tiny::new(2, 3)])
            .unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].packet_type(), PacketType::Tiny);
        assert_eq!(conn.pending_outbound(), 8);
    }

    #[tokio::test]
    async fn telemetry_connection_cannot_send() {
        let udp = UdpChannel::bind("127.0.0.1:0", Duration::ZERO, 512).await.unwrap();
        let mut conn = Connection::from_channels("gauge", ConnectionKind::OutGauge, None, Some(udp));
        assert!(conn.is_connected());
        assert!(matches!(
            conn.send(Tiny::default()),
            Err(ProtocolError::TransportError(_))
        ));
    }

    #[tokio::test]
    async fn checked_message_leaves_queue_untouched() {
        let (mut conn, _host) = tcp_pair().await;
        assert!(matches!(
            conn.send_message_checked(vec![b'a'; 200]),
            Err(ProtocolError::MessageTooLong { .. })
        ));
        assert_eq!(conn.pending_outbound(), 0);
    }
}
