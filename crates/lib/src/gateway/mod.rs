//! Gateway: two datagram listeners (node-facing and remote-facing) sharing one
//! translation pipeline and session table, plus an HTTP control plane.
//!
//! Frames from nodes open or refresh a session and are relayed toward the remote side;
//! replies are matched to their session by reversed flow key and relayed back to the node.

mod control;
mod listener;
mod pipeline;
mod server;
mod stats;
mod transport;

pub use control::{router as control_router, ControlState};
pub use listener::Listener;
pub use pipeline::{Direction, Pipeline, Relayed, RemoteRoute};
pub use server::{run_gateway, Gateway};
pub use stats::{GatewayStats, StatsSnapshot};
pub use transport::{send_with_retry, Transport};
