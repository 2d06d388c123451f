//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.sixtun/config.json`) and environment.
//! Every field has a default, so an empty `{}` file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::frame::HEADER_SIZE;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Listening ports and upstream peer.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Session expiry.
    #[serde(default)]
    pub session: SessionConfig,

    /// Send timeouts, retries and worker limits.
    #[serde(default)]
    pub transport: TransportConfig,

    /// HTTP health/status endpoint.
    #[serde(default)]
    pub control: ControlConfig,
}

/// Where the two datagram listeners bind and where inbound frames are relayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Bind address for both listeners (default "0.0.0.0").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Port constrained nodes send frames to (default 9000).
    #[serde(default = "default_node_port")]
    pub node_port: u16,

    /// Port replies from the remote side arrive on (default 9001).
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,

    /// Fixed upstream peer (`host:port`). When unset, frames are delivered to the peer
    /// address and port they carry. Overridden by SIXTUN_UPSTREAM env.
    #[serde(default)]
    pub upstream: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Sessions idle for longer than this are swept (default 120).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// How often the sweeper runs (default 10).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    /// Upper bound for one send attempt (default 1000).
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Extra attempts after a failed or timed-out send (default 2).
    #[serde(default = "default_send_retries")]
    pub send_retries: u32,

    /// Frames processed concurrently per listener (default 256).
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Largest accepted datagram; longer ones are dropped and counted (default 2048).
    #[serde(default = "default_max_datagram")]
    pub max_datagram: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_control_bind")]
    pub bind: String,

    /// Port for the health/status HTTP endpoint (default 9080).
    #[serde(default = "default_control_port")]
    pub port: u16,
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_node_port() -> u16 {
    9000
}

fn default_remote_port() -> u16 {
    9001
}

fn default_idle_timeout_secs() -> u64 {
    120
}

fn default_sweep_interval_secs() -> u64 {
    10
}

fn default_send_timeout_ms() -> u64 {
    1000
}

fn default_send_retries() -> u32 {
    2
}

fn default_max_in_flight() -> usize {
    256
}

fn default_max_datagram() -> usize {
    2048
}

fn default_true() -> bool {
    true
}

fn default_control_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_control_port() -> u16 {
    9080
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            node_port: default_node_port(),
            remote_port: default_remote_port(),
            upstream: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            send_retries: default_send_retries(),
            max_in_flight: default_max_in_flight(),
            max_datagram: default_max_datagram(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_control_bind(),
            port: default_control_port(),
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl TransportConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Resolve the upstream peer: env SIXTUN_UPSTREAM overrides config. Empty values mean none.
pub fn resolve_upstream(config: &Config) -> Option<String> {
    std::env::var("SIXTUN_UPSTREAM")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .gateway
                .upstream
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Parse an upstream `host:port`, resolving host names.
pub async fn resolve_upstream_addr(upstream: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(upstream)
        .await
        .with_context(|| format!("resolving upstream {}", upstream))?
        .next()
        .with_context(|| format!("upstream {} resolved to no address", upstream))
}

/// Reject values the gateway cannot run with.
pub fn validate(config: &Config) -> Result<()> {
    if config.session.idle_timeout_secs == 0 {
        anyhow::bail!("session.idleTimeoutSecs must be greater than zero");
    }
    if config.session.sweep_interval_secs == 0 {
        anyhow::bail!("session.sweepIntervalSecs must be greater than zero");
    }
    if config.transport.max_in_flight == 0 {
        anyhow::bail!("transport.maxInFlight must be greater than zero");
    }
    if config.transport.max_datagram < HEADER_SIZE {
        anyhow::bail!(
            "transport.maxDatagram must be at least {} (frame header size)",
            HEADER_SIZE
        );
    }
    Ok(())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("SIXTUN_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".sixtun").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or SIXTUN_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    validate(&config).with_context(|| format!("invalid config {}", path.display()))?;
    Ok((config, path))
}
