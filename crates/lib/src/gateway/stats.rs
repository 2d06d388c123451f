//! Per-gateway frame and session counters, exposed through the control plane.

use crate::error::GatewayError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct GatewayStats {
    pub node_frames_in: AtomicU64,
    pub remote_frames_in: AtomicU64,
    pub relayed_to_remote: AtomicU64,
    pub relayed_to_node: AtomicU64,
    pub dropped_truncated: AtomicU64,
    pub dropped_oversized: AtomicU64,
    pub dropped_no_session: AtomicU64,
    pub dropped_no_route: AtomicU64,
    pub dropped_transport: AtomicU64,
    pub sessions_created: AtomicU64,
    pub sessions_expired: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub node_frames_in: u64,
    pub remote_frames_in: u64,
    pub relayed_to_remote: u64,
    pub relayed_to_node: u64,
    pub dropped_truncated: u64,
    pub dropped_oversized: u64,
    pub dropped_no_session: u64,
    pub dropped_no_route: u64,
    pub dropped_transport: u64,
    pub sessions_created: u64,
    pub sessions_expired: u64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_drop(&self, err: &GatewayError) {
        match err {
            GatewayError::Truncated(_) => bump(&self.dropped_truncated),
            GatewayError::NoSession { .. } => bump(&self.dropped_no_session),
            GatewayError::NoRoute(_) => bump(&self.dropped_no_route),
            GatewayError::TransportFailure { .. } => bump(&self.dropped_transport),
            GatewayError::StartupFailure { .. } => {}
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            node_frames_in: get(&self.node_frames_in),
            remote_frames_in: get(&self.remote_frames_in),
            relayed_to_remote: get(&self.relayed_to_remote),
            relayed_to_node: get(&self.relayed_to_node),
            dropped_truncated: get(&self.dropped_truncated),
            dropped_oversized: get(&self.dropped_oversized),
            dropped_no_session: get(&self.dropped_no_session),
            dropped_no_route: get(&self.dropped_no_route),
            dropped_transport: get(&self.dropped_transport),
            sessions_created: get(&self.sessions_created),
            sessions_expired: get(&self.sessions_expired),
        }
    }
}
