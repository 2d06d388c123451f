//! Gateway error taxonomy. Everything except `StartupFailure` is contained to one frame.

use crate::frame::{DecodeError, Flow};
use crate::session::FlowKey;
use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Truncated(#[from] DecodeError),

    #[error("no session for reply {}", .key.flow())]
    NoSession { key: FlowKey },

    #[error("send to {dest} failed after {attempts} attempt(s): {source}")]
    TransportFailure {
        dest: SocketAddr,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("binding {what} on {addr}: {source}")]
    StartupFailure {
        what: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no route toward peer of {0}")]
    NoRoute(Flow),
}

impl GatewayError {
    /// Short label used in drop counters and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Truncated(_) => "truncated",
            GatewayError::NoSession { .. } => "noSession",
            GatewayError::TransportFailure { .. } => "transport",
            GatewayError::StartupFailure { .. } => "startup",
            GatewayError::NoRoute(_) => "noRoute",
        }
    }
}
