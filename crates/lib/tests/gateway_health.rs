//! Integration test: start the gateway on loopback ports, GET / and /sessions, assert JSON.
//! The gateway is stopped through its shutdown future when the test ends.

use sixtun::config::Config;
use sixtun::frame::{self, Address, Flow};
use sixtun::gateway::Gateway;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;

fn loopback_config() -> Config {
    let mut config = Config::default();
    config.gateway.bind = "127.0.0.1".to_string();
    config.gateway.node_port = 0;
    config.gateway.remote_port = 0;
    config.gateway.upstream = Some("127.0.0.1:9".to_string());
    config.control.bind = "127.0.0.1".to_string();
    config.control.port = 0;
    config
}

async fn get_json(client: &reqwest::Client, url: &str) -> serde_json::Value {
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                return resp.json().await.expect("parse JSON");
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "GET {} did not return 200 within 5s; last error: {:?}",
        url, last_err
    );
}

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let gateway = Gateway::bind(loopback_config()).await.expect("bind gateway");
    let control = gateway.control_addr().expect("control endpoint enabled");
    let node_addr = gateway.node_addr().expect("node addr");
    let remote_addr = gateway.remote_addr().expect("remote addr");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(gateway.run(async move {
        let _ = stop_rx.await;
    }));

    let client = reqwest::Client::new();
    let json = get_json(&client, &format!("http://{}/", control)).await;
    assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(
        json.get("nodePort").and_then(|v| v.as_u64()),
        Some(node_addr.port() as u64)
    );
    assert_eq!(
        json.get("remotePort").and_then(|v| v.as_u64()),
        Some(remote_addr.port() as u64)
    );
    assert_eq!(json.get("sessions").and_then(|v| v.as_u64()), Some(0));

    let _ = stop_tx.send(());
    handle.await.expect("join").expect("gateway run");
}

#[tokio::test]
async fn sessions_endpoint_lists_opened_flow() {
    let gateway = Gateway::bind(loopback_config()).await.expect("bind gateway");
    let control = gateway.control_addr().expect("control endpoint enabled");
    let node_addr = gateway.node_addr().expect("node addr");
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(gateway.run(async move {
        let _ = stop_rx.await;
    }));

    let flow = Flow {
        node_address: Address::from("2001:db8::10".parse::<std::net::Ipv6Addr>().unwrap()),
        node_port: 1500,
        peer_address: Address::from("2001:db8::20".parse::<std::net::Ipv6Addr>().unwrap()),
        peer_port: 1501,
    };
    let node = UdpSocket::bind("127.0.0.1:0").await.expect("bind node");
    node.send_to(&frame::encode(&flow, b"hi"), node_addr)
        .await
        .expect("send frame");

    let client = reqwest::Client::new();
    let url = format!("http://{}/sessions", control);
    let mut listed = None;
    for _ in 0..100 {
        let json = get_json(&client, &url).await;
        let sessions = json
            .get("sessions")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        if !sessions.is_empty() {
            listed = Some(sessions);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let sessions = listed.expect("session never appeared");
    assert_eq!(sessions.len(), 1);
    let s = &sessions[0];
    assert_eq!(s.get("nodeAddress").and_then(|v| v.as_str()), Some("2001:db8::10"));
    assert_eq!(s.get("nodePort").and_then(|v| v.as_u64()), Some(1500));
    assert_eq!(s.get("peerAddress").and_then(|v| v.as_str()), Some("2001:db8::20"));
    assert_eq!(s.get("peerPort").and_then(|v| v.as_u64()), Some(1501));
    assert!(s
        .get("id")
        .and_then(|v| v.as_str())
        .is_some_and(|id| id.starts_with("sess-")));

    let _ = stop_tx.send(());
    handle.await.expect("join").expect("gateway run");
}
