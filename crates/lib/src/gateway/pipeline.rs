//! Per-datagram translation: decode, sessionize, re-encode, send.
//!
//! Each datagram moves `Received -> Decoded -> Sessionized -> Responded` inside a single
//! call; any error ends the frame there (logged and counted, nothing else disturbed).
//! Direction is decided by which listener received the datagram, never by its content.

use crate::error::GatewayError;
use crate::frame::{self, Flow};
use crate::gateway::stats::{bump, GatewayStats};
use crate::gateway::transport::{send_with_retry, Transport};
use crate::session::{FlowKey, SessionEntry, SessionId, SessionTable, PROTOCOL_UDP};
use std::fmt;
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Which listener a datagram arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From a constrained node, to be relayed toward its peer.
    FromNode,
    /// From the remote side, a reply to be relayed back to the node.
    FromRemote,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::FromNode => f.write_str("node"),
            Direction::FromRemote => f.write_str("remote"),
        }
    }
}

/// Where inbound frames go on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRoute {
    /// Every frame goes to one fixed peer.
    Upstream(SocketAddr),
    /// The frame's own peer address and port.
    Direct,
}

impl RemoteRoute {
    fn destination(&self, flow: &Flow) -> Result<SocketAddr, GatewayError> {
        match self {
            RemoteRoute::Upstream(addr) => Ok(*addr),
            RemoteRoute::Direct => {
                let ip = Ipv6Addr::from(flow.peer_address);
                if ip.is_unspecified() || flow.peer_port == 0 {
                    return Err(GatewayError::NoRoute(*flow));
                }
                Ok(match ip.to_ipv4_mapped() {
                    Some(v4) => SocketAddr::from((v4, flow.peer_port)),
                    None => SocketAddr::from((ip, flow.peer_port)),
                })
            }
        }
    }
}

/// A frame that made it all the way through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relayed {
    pub session_id: SessionId,
    pub dest: SocketAddr,
    pub len: usize,
}

pub struct Pipeline {
    sessions: Arc<SessionTable>,
    stats: Arc<GatewayStats>,
    node_side: Arc<dyn Transport>,
    remote_side: Arc<dyn Transport>,
    route: RemoteRoute,
    send_timeout: Duration,
    send_retries: u32,
}

impl Pipeline {
    pub fn new(
        sessions: Arc<SessionTable>,
        stats: Arc<GatewayStats>,
        node_side: Arc<dyn Transport>,
        remote_side: Arc<dyn Transport>,
        route: RemoteRoute,
    ) -> Self {
        Self {
            sessions,
            stats,
            node_side,
            remote_side,
            route,
            send_timeout: Duration::from_secs(1),
            send_retries: 2,
        }
    }

    pub fn with_send_policy(mut self, timeout: Duration, retries: u32) -> Self {
        self.send_timeout = timeout;
        self.send_retries = retries;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    pub fn stats(&self) -> &Arc<GatewayStats> {
        &self.stats
    }

    /// Run one received datagram to completion. Errors are logged and counted here;
    /// the result is returned for callers that want it.
    pub async fn process(
        &self,
        direction: Direction,
        datagram: &[u8],
        sender: SocketAddr,
    ) -> Result<Relayed, GatewayError> {
        log::trace!("{} frame received: {} bytes from {}", direction, datagram.len(), sender);
        let result = match direction {
            Direction::FromNode => self.relay_from_node(datagram, sender).await,
            Direction::FromRemote => self.relay_to_node(datagram, sender).await,
        };
        match &result {
            Ok(r) => log::debug!(
                "{} frame from {} relayed to {} ({} bytes, {})",
                direction,
                sender,
                r.dest,
                r.len,
                r.session_id
            ),
            Err(e) => {
                self.stats.record_drop(e);
                log::warn!("dropped {} frame from {} [{}]: {}", direction, sender, e.kind(), e);
            }
        }
        result
    }

    async fn relay_from_node(
        &self,
        datagram: &[u8],
        sender: SocketAddr,
    ) -> Result<Relayed, GatewayError> {
        bump(&self.stats.node_frames_in);
        let (flow, payload) = frame::decode(datagram)?;
        log::trace!("decoded {} ({} byte payload)", flow, payload.len());

        // Unroutable frames must not leave a session behind.
        let dest = self.route.destination(&flow)?;

        let key = FlowKey::new(&flow, PROTOCOL_UDP);
        let (session, created) = self
            .sessions
            .get_or_create(key, |k| SessionEntry::new(*k, sender))
            .await;
        if created {
            bump(&self.stats.sessions_created);
            log::info!("session {} opened for {} via {}", session.id, flow, sender);
        }
        self.sessions.touch_from(&key, sender).await;
        log::trace!("sessionized {} as {}", flow, session.id);

        let out = frame::encode(&session.key.flow(), payload);
        send_with_retry(
            self.remote_side.as_ref(),
            &out,
            dest,
            self.send_timeout,
            self.send_retries,
        )
        .await?;
        bump(&self.stats.relayed_to_remote);
        Ok(Relayed {
            session_id: session.id,
            dest,
            len: out.len(),
        })
    }

    async fn relay_to_node(
        &self,
        datagram: &[u8],
        sender: SocketAddr,
    ) -> Result<Relayed, GatewayError> {
        bump(&self.stats.remote_frames_in);
        let (flow, payload) = frame::decode(datagram)?;
        log::trace!("decoded reply {} from {} ({} byte payload)", flow, sender, payload.len());

        let key = FlowKey::for_reply(&flow, PROTOCOL_UDP);
        let session = self
            .sessions
            .lookup(&key)
            .await
            .ok_or(GatewayError::NoSession { key })?;
        self.sessions.touch(&key).await;

        // Reply frames carry the original peer in the node slot.
        let out = frame::encode(&session.key.flow().reversed(), payload);
        let dest = session.node_endpoint;
        send_with_retry(
            self.node_side.as_ref(),
            &out,
            dest,
            self.send_timeout,
            self.send_retries,
        )
        .await?;
        bump(&self.stats.relayed_to_node);
        Ok(Relayed {
            session_id: session.id,
            dest,
            len: out.len(),
        })
    }
}
