//! End-to-end scenarios from the multiplexer's testable-properties list.
//!
//! Each test wires two [`Multiplexer`]s together with an in-process
//! [`RecordingSink`] standing in for the real WebRTC data channel — it
//! records every packet it's asked to send (for wire-level assertions) and
//! forwards the bytes to the peer multiplexer's `on_message`, preserving
//! send order the same way a real reliable, ordered channel would.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tunnel_core::{DataChannelSink, Multiplexer};
use tunnel_proto::{Payload, TunnelPacket};

struct RecordingSink {
    forward: mpsc::UnboundedSender<Vec<u8>>,
    recorded: Arc<Mutex<Vec<TunnelPacket>>>,
}

#[async_trait]
impl DataChannelSink for RecordingSink {
    async fn send(&self, bytes: Vec<u8>) -> std::io::Result<()> {
        if let Ok(packet) = tunnel_proto::decode(&bytes) {
            self.recorded.lock().await.push(packet);
        }
        self.forward
            .send(bytes)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone"))
    }
}

/// Two multiplexers bridged directly to each other, as if connected by a
/// real reliable data channel.
struct Link {
    origin: Arc<Multiplexer>,
    dest: Arc<Multiplexer>,
    origin_sent: Arc<Mutex<Vec<TunnelPacket>>>,
    dest_sent: Arc<Mutex<Vec<TunnelPacket>>>,
}

fn build_link() -> Link {
    let (o2d_tx, mut o2d_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (d2o_tx, mut d2o_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let origin_sent = Arc::new(Mutex::new(Vec::new()));
    let dest_sent = Arc::new(Mutex::new(Vec::new()));

    let origin = Arc::new(Multiplexer::new(Arc::new(RecordingSink {
        forward: o2d_tx,
        recorded: origin_sent.clone(),
    })));
    let dest = Arc::new(Multiplexer::new(Arc::new(RecordingSink {
        forward: d2o_tx,
        recorded: dest_sent.clone(),
    })));

    {
        let dest = dest.clone();
        tokio::spawn(async move {
            while let Some(bytes) = o2d_rx.recv().await {
                dest.on_message(&bytes).await;
            }
        });
    }
    {
        let origin = origin.clone();
        tokio::spawn(async move {
            while let Some(bytes) = d2o_rx.recv().await {
                origin.on_message(&bytes).await;
            }
        });
    }

    Link {
        origin,
        dest,
        origin_sent,
        dest_sent,
    }
}

async fn bind_echo_server() -> (Arc<UdpSocket>, u16) {
    let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let port = socket.local_addr().unwrap().port();
    let echo = socket.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            match echo.recv_from(&mut buf).await {
                Ok((len, from)) => {
                    let _ = echo.send_to(&buf[..len], from).await;
                }
                Err(_) => return,
            }
        }
    });
    (socket, port)
}

/// Poll `f` until it returns `Some`, or panic after the deadline.
async fn wait_for<T>(mut f: impl FnMut() -> Option<T>) -> T {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(v) = f() {
            return v;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within deadline");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn scenario_a_single_client_echo() {
    let link = build_link();
    let (_echo_socket, echo_port) = bind_echo_server().await;

    link.origin
        .forward_to_remote(29001, "127.0.0.1", echo_port)
        .await
        .unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(b"ping", "127.0.0.1:29001")
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
        .await
        .expect("timed out waiting for echo reply")
        .unwrap();
    assert_eq!(&buf[..len], b"ping");

    // The origin side emitted NewClient{id=0} strictly before Data{id=0, false, "ping"}.
    let kinds: Vec<&'static str> = wait_for(|| {
        let packets = link.origin_sent.try_lock().ok()?;
        if packets.len() < 2 {
            return None;
        }
        let kinds: Vec<&'static str> = packets
            .iter()
            .map(|p| match &p.payload {
                Some(Payload::NewClient(_)) => "new_client",
                Some(Payload::Data(_)) => "data",
                None => "empty",
            })
            .collect();
        Some(kinds)
    })
    .await;

    assert_eq!(kinds[0], "new_client");
    assert_eq!(kinds[1], "data");
}

#[tokio::test]
async fn scenario_b_two_clients_same_rule() {
    let link = build_link();
    let (_echo_socket, echo_port) = bind_echo_server().await;

    link.origin
        .forward_to_remote(29002, "127.0.0.1", echo_port)
        .await
        .unwrap();

    let client_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client_a.send_to(b"a", "127.0.0.1:29002").await.unwrap();
    client_b.send_to(b"b", "127.0.0.1:29002").await.unwrap();

    let mut buf = [0u8; 64];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), client_a.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..len], b"a");
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), client_b.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..len], b"b");

    // Two distinct ids were minted, one NewClient apiece.
    let new_client_ids: Vec<u32> = wait_for(|| {
        // Accessed via try_lock since we're in an async test already polling.
        let packets = link.dest_sent.try_lock().ok()?;
        let ids: Vec<u32> = packets
            .iter()
            .filter_map(|p| match &p.payload {
                Some(Payload::NewClient(nc)) => Some(nc.client_id),
                _ => None,
            })
            .collect();
        if ids.len() >= 2 {
            Some(ids)
        } else {
            None
        }
    })
    .await;

    assert_eq!(new_client_ids.len(), 2);
    assert_ne!(new_client_ids[0], new_client_ids[1]);
}

#[tokio::test]
async fn scenario_c_repeated_send_from_same_source() {
    let link = build_link();
    let (_echo_socket, echo_port) = bind_echo_server().await;

    link.origin
        .forward_to_remote(29003, "127.0.0.1", echo_port)
        .await
        .unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for _ in 0..100 {
        client.send_to(b"x", "127.0.0.1:29003").await.unwrap();
    }

    let mut replies = 0;
    let mut buf = [0u8; 64];
    while replies < 100 {
        tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .expect("timed out waiting for echoes")
            .unwrap();
        replies += 1;
    }

    let (new_client_count, data_count) = wait_for(|| {
        let packets = link.dest_sent.try_lock().ok()?;
        let new_clients = packets
            .iter()
            .filter(|p| matches!(p.payload, Some(Payload::NewClient(_))))
            .count();
        let datas = packets
            .iter()
            .filter(|p| matches!(p.payload, Some(Payload::Data(_))))
            .count();
        if datas >= 100 {
            Some((new_clients, datas))
        } else {
            None
        }
    })
    .await;

    assert_eq!(new_client_count, 1, "exactly one NewClient for one source address");
    assert_eq!(data_count, 100);
}

#[tokio::test]
async fn scenario_d_unknown_return_id_is_dropped_not_crashed() {
    let link = build_link();

    // Forge Data{id=99, is_response=true} with no matching localClients entry.
    let forged = tunnel_proto::data(99, true, b"x".to_vec());
    link.origin.on_message(&tunnel_proto::encode(&forged)).await;

    // The session remains healthy: a legitimate forwarder rule still works.
    let (_echo_socket, echo_port) = bind_echo_server().await;
    link.origin
        .forward_to_remote(29004, "127.0.0.1", echo_port)
        .await
        .unwrap();
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(b"still-alive", "127.0.0.1:29004").await.unwrap();
    let mut buf = [0u8; 64];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
        .await
        .expect("tunnel should still be healthy after the forged packet")
        .unwrap();
    assert_eq!(&buf[..len], b"still-alive");
}

#[tokio::test]
async fn scenario_e_destination_dial_failure_drops_only_that_flow() {
    let link = build_link();

    // NewClient referencing a host that cannot resolve.
    let bad = tunnel_proto::new_client(0, "this.host.does.not.exist.invalid", 1);
    link.dest.on_message(&tunnel_proto::encode(&bad)).await;

    // Subsequent Data for that id is dropped, not panicking.
    let orphan_data = tunnel_proto::data(0, false, b"x".to_vec());
    link.dest.on_message(&tunnel_proto::encode(&orphan_data)).await;

    // Other flows are unaffected: a second, valid NewClient still works.
    let (_echo_socket, echo_port) = bind_echo_server().await;
    link.origin
        .forward_to_remote(29005, "127.0.0.1", echo_port)
        .await
        .unwrap();
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(b"ok", "127.0.0.1:29005").await.unwrap();
    let mut buf = [0u8; 64];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
        .await
        .expect("other flows should be unaffected by one dial failure")
        .unwrap();
    assert_eq!(&buf[..len], b"ok");
}

#[tokio::test]
async fn scenario_f_channel_close_stops_cleanly() {
    let link = build_link();
    let (_echo_socket, echo_port) = bind_echo_server().await;

    link.origin
        .forward_to_remote(29006, "127.0.0.1", echo_port)
        .await
        .unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(b"hi", "127.0.0.1:29006").await.unwrap();
    let mut buf = [0u8; 64];
    tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();

    // Stop does not panic and returns promptly.
    link.origin.stop().await;
    link.dest.stop().await;
}

#[tokio::test]
async fn duplicate_forward_to_remote_port_is_rejected() {
    let link = build_link();
    link.origin
        .forward_to_remote(29007, "127.0.0.1", 9)
        .await
        .unwrap();
    let err = link
        .origin
        .forward_to_remote(29007, "127.0.0.1", 9)
        .await
        .unwrap_err();
    assert!(matches!(err, tunnel_core::TunnelError::PortInUse(29007)));
}
