//! Integration test: a node frame goes out through the gateway to a fake upstream server,
//! the server answers with the addressing swapped, and the reply comes back to the node.

use sixtun::config::Config;
use sixtun::frame::{self, Address, Flow};
use sixtun::gateway::Gateway;
use std::net::{Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn flow() -> Flow {
    Flow {
        node_address: Address::from("2001:db8:ac10:fe01::".parse::<Ipv6Addr>().unwrap()),
        node_port: 1515,
        peer_address: Address::from("2001:db8:ac10:fe01::1".parse::<Ipv6Addr>().unwrap()),
        peer_port: 1516,
    }
}

async fn start(upstream: SocketAddr) -> (SocketAddr, SocketAddr, Gateway) {
    start_with(upstream, Config::default()).await
}

async fn start_with(upstream: SocketAddr, mut config: Config) -> (SocketAddr, SocketAddr, Gateway) {
    config.gateway.bind = "127.0.0.1".to_string();
    config.gateway.node_port = 0;
    config.gateway.remote_port = 0;
    config.gateway.upstream = Some(upstream.to_string());
    config.control.enabled = false;
    let gateway = Gateway::bind(config).await.expect("bind gateway");
    let node_addr = gateway.node_addr().expect("node addr");
    let remote_addr = gateway.remote_addr().expect("remote addr");
    (node_addr, remote_addr, gateway)
}

#[tokio::test]
async fn frame_round_trips_through_upstream() {
    let upstream = UdpSocket::bind("127.0.0.1:0").await.expect("bind upstream");
    let (node_addr, remote_addr, gateway) = start(upstream.local_addr().unwrap()).await;
    let stats = gateway.stats();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(gateway.run(async move {
        let _ = stop_rx.await;
    }));

    let node = UdpSocket::bind("127.0.0.1:0").await.expect("bind node");
    let request = frame::encode(&flow(), b"Hello");
    node.send_to(&request, node_addr).await.expect("send request");

    let mut buf = [0u8; 2048];
    let (n, from) = timeout(WAIT, upstream.recv_from(&mut buf))
        .await
        .expect("upstream receive timed out")
        .expect("upstream receive");
    assert_eq!(&buf[..n], request.as_slice());
    // The relayed frame leaves from the remote-facing socket.
    assert_eq!(from, remote_addr);

    // Echo-server behaviour: swap the addressing and answer to the remote listener.
    let (seen, _) = frame::decode(&buf[..n]).expect("decode relayed frame");
    let reply = frame::encode(&seen.reversed(), b"Message from server #0");
    upstream.send_to(&reply, remote_addr).await.expect("send reply");

    let (n, from) = timeout(WAIT, node.recv_from(&mut buf))
        .await
        .expect("node receive timed out")
        .expect("node receive");
    assert_eq!(from, node_addr);
    let (back, payload) = frame::decode(&buf[..n]).expect("decode reply");
    assert_eq!(back, flow().reversed());
    assert_eq!(payload, b"Message from server #0");

    let snap = stats.snapshot();
    assert_eq!(snap.sessions_created, 1);
    assert_eq!(snap.relayed_to_remote, 1);
    assert_eq!(snap.relayed_to_node, 1);

    let _ = stop_tx.send(());
    handle.await.expect("join").expect("gateway run");
}

#[tokio::test]
async fn unsolicited_reply_is_dropped() {
    let upstream = UdpSocket::bind("127.0.0.1:0").await.expect("bind upstream");
    let (_node_addr, remote_addr, gateway) = start(upstream.local_addr().unwrap()).await;
    let stats = gateway.stats();
    let sessions = gateway.sessions();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(gateway.run(async move {
        let _ = stop_rx.await;
    }));

    let reply = frame::encode(&flow().reversed(), b"nobody asked");
    upstream.send_to(&reply, remote_addr).await.expect("send reply");

    let mut dropped = false;
    for _ in 0..100 {
        if stats.snapshot().dropped_no_session == 1 {
            dropped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(dropped, "reply without session was not counted as dropped");
    assert_eq!(stats.snapshot().relayed_to_node, 0);
    assert!(sessions.is_empty().await);

    let _ = stop_tx.send(());
    handle.await.expect("join").expect("gateway run");
}

#[tokio::test]
async fn oversized_frame_is_not_relayed() {
    let upstream = UdpSocket::bind("127.0.0.1:0").await.expect("bind upstream");
    let mut config = Config::default();
    config.transport.max_datagram = 64;
    let (node_addr, _remote_addr, gateway) = start_with(upstream.local_addr().unwrap(), config).await;
    let stats = gateway.stats();
    let sessions = gateway.sessions();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(gateway.run(async move {
        let _ = stop_rx.await;
    }));

    let node = UdpSocket::bind("127.0.0.1:0").await.expect("bind node");
    let oversized = frame::encode(&flow(), &[0x5a; 100]);
    node.send_to(&oversized, node_addr).await.expect("send frame");

    let mut dropped = false;
    for _ in 0..100 {
        if stats.snapshot().dropped_oversized == 1 {
            dropped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(dropped, "oversized frame was not counted as dropped");

    let mut buf = [0u8; 2048];
    assert!(
        timeout(Duration::from_millis(200), upstream.recv_from(&mut buf))
            .await
            .is_err(),
        "oversized frame reached the upstream"
    );
    assert_eq!(stats.snapshot().relayed_to_remote, 0);
    assert!(sessions.is_empty().await);

    let _ = stop_tx.send(());
    handle.await.expect("join").expect("gateway run");
}
