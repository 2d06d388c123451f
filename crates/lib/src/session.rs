//! Session table: flow identity -> session record, the gateway's translation memory.
//!
//! One entry per distinct [`FlowKey`]. Created by the first inbound frame of a flow,
//! refreshed on every frame in either direction and removed by the idle sweep or explicit
//! teardown. Scoped to one gateway instance; nothing persists across restarts.

use crate::frame::{Address, Flow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Protocol tag for UDP-carried flows; the only protocol the frame format currently carries.
pub const PROTOCOL_UDP: u8 = 17;

/// Unique session identifier (opaque string).
pub type SessionId = String;

/// Identity of a bidirectional flow. Equality is by value over all fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub node_address: Address,
    pub node_port: u16,
    pub peer_address: Address,
    pub peer_port: u16,
    pub protocol: u8,
}

impl FlowKey {
    pub fn new(flow: &Flow, protocol: u8) -> Self {
        Self {
            node_address: flow.node_address,
            node_port: flow.node_port,
            peer_address: flow.peer_address,
            peer_port: flow.peer_port,
            protocol,
        }
    }

    /// Key for the flow as it was seen inbound, given a reply frame's addressing
    /// (reply's node slot = original peer).
    pub fn for_reply(reply: &Flow, protocol: u8) -> Self {
        Self::new(&reply.reversed(), protocol)
    }

    pub fn flow(&self) -> Flow {
        Flow {
            node_address: self.node_address,
            node_port: self.node_port,
            peer_address: self.peer_address,
            peer_port: self.peer_port,
        }
    }
}

/// One tracked flow.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub id: SessionId,
    pub key: FlowKey,
    /// Transport port the flow was relayed through on the node side.
    pub gateway_local_port: u16,
    /// Node-side transport endpoint replies are delivered to.
    pub node_endpoint: SocketAddr,
    pub created_at: DateTime<Utc>,
    pub last_seen: Instant,
}

impl SessionEntry {
    pub fn new(key: FlowKey, node_endpoint: SocketAddr) -> Self {
        Self {
            id: format!("sess-{}", uuid::Uuid::new_v4()),
            key,
            gateway_local_port: node_endpoint.port(),
            node_endpoint,
            created_at: Utc::now(),
            last_seen: Instant::now(),
        }
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    pub fn summary(&self, now: Instant) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            node_address: self.key.node_address.to_string(),
            node_port: self.key.node_port,
            peer_address: self.key.peer_address.to_string(),
            peer_port: self.key.peer_port,
            protocol: self.key.protocol,
            node_endpoint: self.node_endpoint.to_string(),
            gateway_local_port: self.gateway_local_port,
            created_at: self.created_at,
            idle_ms: self.idle_for(now).as_millis() as u64,
        }
    }
}

/// Serializable view of a session for the control plane.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub node_address: String,
    pub node_port: u16,
    pub peer_address: String,
    pub peer_port: u16,
    pub protocol: u8,
    pub node_endpoint: String,
    pub gateway_local_port: u16,
    pub created_at: DateTime<Utc>,
    pub idle_ms: u64,
}

/// Concurrent flow table. Reads share the lock; every structural change holds it exclusively.
#[derive(Default)]
pub struct SessionTable {
    inner: RwLock<HashMap<FlowKey, SessionEntry>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Return a clone of the entry if the key is tracked.
    pub async fn lookup(&self, key: &FlowKey) -> Option<SessionEntry> {
        self.inner.read().await.get(key).cloned()
    }

    /// Return the existing entry for `key`, or insert the one built by `on_create`.
    /// The check and the insert happen under one write lock, so concurrent callers with the
    /// same key all observe the same entry. The flag is true when this call created it.
    pub async fn get_or_create<F>(&self, key: FlowKey, on_create: F) -> (SessionEntry, bool)
    where
        F: FnOnce(&FlowKey) -> SessionEntry,
    {
        let mut g = self.inner.write().await;
        if let Some(existing) = g.get(&key) {
            return (existing.clone(), false);
        }
        let entry = on_create(&key);
        g.insert(key, entry.clone());
        (entry, true)
    }

    /// Refresh `last_seen`. Returns false (and creates nothing) when the key is absent.
    pub async fn touch(&self, key: &FlowKey) -> bool {
        match self.inner.write().await.get_mut(key) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Refresh `last_seen` and re-point replies at the endpoint the node last sent from.
    /// Returns false (and creates nothing) when the key is absent.
    pub async fn touch_from(&self, key: &FlowKey, node_endpoint: SocketAddr) -> bool {
        match self.inner.write().await.get_mut(key) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                entry.node_endpoint = node_endpoint;
                entry.gateway_local_port = node_endpoint.port();
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, key: &FlowKey) -> bool {
        self.inner.write().await.remove(key).is_some()
    }

    /// Drop every entry idle for longer than `max_idle`; returns how many were removed.
    pub async fn sweep_expired(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut g = self.inner.write().await;
        let before = g.len();
        g.retain(|_, entry| entry.idle_for(now) <= max_idle);
        before - g.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<SessionSummary> {
        let now = Instant::now();
        let g = self.inner.read().await;
        let mut out: Vec<SessionSummary> = g.values().map(|e| e.summary(now)).collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }
}
