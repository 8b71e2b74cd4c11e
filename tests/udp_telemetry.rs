//! UDP channel behaviour: size classification, typed packets over UDP,
//! framing errors and the telemetry idle timeout

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use insim_protocol::config::{EngineConfig, TelemetryConfig};
use insim_protocol::core::constants::tiny;
use insim_protocol::core::packet::{Mci, Packet, PacketType};
use insim_protocol::core::records::CompCar;
use insim_protocol::core::telemetry::{OutGauge, OutSim};
use insim_protocol::core::wire::FixedStr;
use insim_protocol::transport::{TcpChannel, UdpChannel};
use insim_protocol::{Connection, ConnectionKind, Event, EventKey, EventLoop};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

type Log = Arc<Mutex<Vec<String>>>;

fn record_all(conn: &mut Connection, log: &Log) {
    let keys = [
        EventKey::Init,
        EventKey::Close,
        EventKey::Error,
        EventKey::Timeout,
        EventKey::All,
        EventKey::OutSim,
        EventKey::OutGauge,
    ];
    for key in keys {
        let log = log.clone();
        conn.bind(key, move |_, event: &Event<'_>| {
            let entry = match event {
                Event::Packet(p) => format!("packet:{}", p.packet_type().name()),
                Event::OutSim(sim) => format!("outsim:{}", sim.time),
                Event::OutGauge(gauge) => format!("outgauge:{}", gauge.car.to_string_lossy()),
                Event::Error(err) => format!("error:{err}"),
                other => format!("{:?}", other.key()),
            };
            log.lock().unwrap().push(entry);
            Ok(())
        });
    }
}

async fn drive_until(conn: &mut Connection, done: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            let _ = tokio::time::timeout(Duration::from_millis(20), conn.ready()).await;
            conn.process().unwrap();
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn sender_to(conn: &Connection) -> UdpSocket {
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.connect(conn.udp_local_addr().unwrap()).await.unwrap();
    sender
}

/// InSim connection with both channels, already past `Init`.
async fn insim_with_udp() -> (Connection, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tcp, accepted) = tokio::join!(TcpChannel::connect(addr, 2048, 4096), listener.accept());
    let udp = UdpChannel::bind("127.0.0.1:0", Duration::ZERO, 512).await.unwrap();
    let mut conn = Connection::from_channels(
        "insim+udp",
        ConnectionKind::InSim,
        Some(tcp.unwrap()),
        Some(udp),
    );
    conn.process().unwrap();
    (conn, accepted.unwrap().0)
}

fn telemetry_config(timeout: Duration) -> TelemetryConfig {
    TelemetryConfig {
        host: "127.0.0.1".into(),
        port: 0,
        name: "telemetry".into(),
        timeout,
    }
}

#[tokio::test]
async fn datagrams_are_classified_by_length() {
    let (mut conn, _host) = insim_with_udp().await;
    let log: Log = Arc::default();
    record_all(&mut conn, &log);
    let sender = sender_to(&conn).await;

    let sim = OutSim { time: 42, ..Default::default() };
    sender.send(&sim.encode()).await.unwrap();

    let gauge = OutGauge {
        car: FixedStr::from("FZR"),
        id: Some(3),
        ..Default::default()
    };
    sender.send(&gauge.encode()).await.unwrap();

    let mci = Packet::from(Mci::new(0, vec![CompCar::default()]));
    let mci_bytes = mci.encode().unwrap();
    assert_eq!(mci_bytes.len(), 32);
    sender.send(&mci_bytes).await.unwrap();

    drive_until(&mut conn, || log.lock().unwrap().len() >= 3).await;
    assert_eq!(
        *log.lock().unwrap(),
        ["outsim:42", "outgauge:FZR", "packet:Mci"]
    );
}

#[tokio::test]
async fn keepalive_over_udp_is_not_echoed() {
    let (mut conn, _host) = insim_with_udp().await;
    let log: Log = Arc::default();
    record_all(&mut conn, &log);
    let sender = sender_to(&conn).await;

    sender.send(&[4, PacketType::Tiny.code(), 0, tiny::NONE]).await.unwrap();
    drive_until(&mut conn, || !log.lock().unwrap().is_empty()).await;

    assert_eq!(*log.lock().unwrap(), ["packet:Tiny"]);
    assert_eq!(conn.pending_outbound(), 0);
}

#[tokio::test]
async fn unaligned_datagram_closes_with_error() {
    let (mut conn, _host) = insim_with_udp().await;
    let log: Log = Arc::default();
    record_all(&mut conn, &log);
    let sender = sender_to(&conn).await;

    sender.send(&[0u8; 10]).await.unwrap();
    drive_until(&mut conn, || !log.lock().unwrap().is_empty()).await;

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].starts_with("error:Framing error"), "{log:?}");
    assert!(conn.is_closed());
}

#[tokio::test]
async fn outgauge_listener_dispatches_and_ignores_unknown_sizes() {
    let mut conn = Connection::outgauge(&telemetry_config(Duration::ZERO), &EngineConfig::default())
        .await
        .unwrap();
    assert!(conn.is_connected());
    let log: Log = Arc::default();
    record_all(&mut conn, &log);
    let sender = sender_to(&conn).await;

    sender.send(&[0u8; 32]).await.unwrap();
    let gauge = OutGauge {
        car: FixedStr::from("XRG"),
        ..Default::default()
    };
    sender.send(&gauge.encode()).await.unwrap();

    drive_until(&mut conn, || !log.lock().unwrap().is_empty()).await;
    assert_eq!(*log.lock().unwrap(), ["outgauge:XRG"]);
    assert!(!conn.is_closed());
}

#[tokio::test]
async fn idle_listener_times_out_once() {
    let mut conn = Connection::outsim(
        &telemetry_config(Duration::from_millis(150)),
        &EngineConfig::default(),
    )
    .await
    .unwrap();
    let log: Log = Arc::default();
    record_all(&mut conn, &log);

    let mut event_loop = EventLoop::new(Duration::from_millis(10));
    let id = event_loop.add(conn);
    let started = Instant::now();
    tokio::time::timeout(Duration::from_secs(5), event_loop.run())
        .await
        .expect("loop should end on timeout")
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(*log.lock().unwrap(), ["Timeout"]);
    let conn = event_loop.connection_mut(id).unwrap();
    assert!(conn.is_closed());

    conn.process().unwrap();
    conn.close().unwrap();
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn datagrams_keep_the_listener_alive() {
    let mut conn = Connection::outsim(
        &telemetry_config(Duration::from_millis(300)),
        &EngineConfig::default(),
    )
    .await
    .unwrap();
    let log: Log = Arc::default();
    record_all(&mut conn, &log);
    let sender = sender_to(&conn).await;

    for time in 1..=4u32 {
        let sim = OutSim { time, ..Default::default() };
        sender.send(&sim.encode()).await.unwrap();
        let expected = time as usize;
        drive_until(&mut conn, || log.lock().unwrap().len() >= expected).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert!(!conn.is_closed());
    assert!(!log.lock().unwrap().iter().any(|e| e == "Timeout"));
}
