//! Gateway lifecycle: bind both datagram endpoints and the control plane, run listeners,
//! the idle sweeper and the HTTP server until shutdown.

use crate::config::{self, Config};
use crate::error::GatewayError;
use crate::gateway::control::{self, ControlState};
use crate::gateway::listener::Listener;
use crate::gateway::pipeline::{Direction, Pipeline, RemoteRoute};
use crate::gateway::stats::GatewayStats;
use crate::session::SessionTable;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;

/// A bound, not yet running gateway. All sockets are open, so ports are known.
pub struct Gateway {
    config: Config,
    node_socket: Arc<UdpSocket>,
    remote_socket: Arc<UdpSocket>,
    control_listener: Option<TcpListener>,
    route: RemoteRoute,
    sessions: Arc<SessionTable>,
    stats: Arc<GatewayStats>,
}

async fn bind_udp(what: &'static str, host: &str, port: u16) -> Result<UdpSocket, GatewayError> {
    UdpSocket::bind((host, port))
        .await
        .map_err(|source| GatewayError::StartupFailure {
            what,
            addr: format!("{}:{}", host, port),
            source,
        })
}

impl Gateway {
    /// Bind node-facing, remote-facing and control sockets. Any bind failure is a
    /// `StartupFailure` and nothing is left running.
    pub async fn bind(config: Config) -> Result<Self> {
        config::validate(&config)?;
        let route = match config::resolve_upstream(&config) {
            Some(upstream) => RemoteRoute::Upstream(config::resolve_upstream_addr(&upstream).await?),
            None => RemoteRoute::Direct,
        };

        let host = config.gateway.bind.trim();
        let node_socket = bind_udp("node listener", host, config.gateway.node_port).await?;
        let remote_socket = bind_udp("remote listener", host, config.gateway.remote_port).await?;

        let control_listener = if config.control.enabled {
            let control_host = config.control.bind.trim();
            let listener = TcpListener::bind((control_host, config.control.port))
                .await
                .map_err(|source| GatewayError::StartupFailure {
                    what: "control endpoint",
                    addr: format!("{}:{}", control_host, config.control.port),
                    source,
                })?;
            Some(listener)
        } else {
            None
        };

        Ok(Self {
            config,
            node_socket: Arc::new(node_socket),
            remote_socket: Arc::new(remote_socket),
            control_listener,
            route,
            sessions: Arc::new(SessionTable::new()),
            stats: Arc::new(GatewayStats::new()),
        })
    }

    pub fn node_addr(&self) -> std::io::Result<SocketAddr> {
        self.node_socket.local_addr()
    }

    pub fn remote_addr(&self) -> std::io::Result<SocketAddr> {
        self.remote_socket.local_addr()
    }

    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_listener
            .as_ref()
            .and_then(|l| l.local_addr().ok())
    }

    pub fn sessions(&self) -> Arc<SessionTable> {
        self.sessions.clone()
    }

    pub fn stats(&self) -> Arc<GatewayStats> {
        self.stats.clone()
    }

    /// Run until `shutdown` completes, then stop every task this gateway started.
    pub async fn run<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        let node_addr = self.node_addr().context("node socket address")?;
        let remote_addr = self.remote_addr().context("remote socket address")?;
        match self.route {
            RemoteRoute::Upstream(addr) => log::info!("relaying node frames to upstream {}", addr),
            RemoteRoute::Direct => log::info!("relaying node frames directly to their peer address"),
        }

        let transport_cfg = &self.config.transport;
        let pipeline = Arc::new(
            Pipeline::new(
                self.sessions.clone(),
                self.stats.clone(),
                self.node_socket.clone(),
                self.remote_socket.clone(),
                self.route,
            )
            .with_send_policy(transport_cfg.send_timeout(), transport_cfg.send_retries),
        );

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        for (direction, socket) in [
            (Direction::FromNode, self.node_socket.clone()),
            (Direction::FromRemote, self.remote_socket.clone()),
        ] {
            let listener = Listener::new(
                direction,
                socket,
                pipeline.clone(),
                transport_cfg.max_in_flight,
                transport_cfg.max_datagram,
            );
            tasks.push(tokio::spawn(listener.run()));
        }

        tasks.push(tokio::spawn(run_sweeper(
            self.sessions.clone(),
            self.stats.clone(),
            self.config.session.idle_timeout(),
            self.config.session.sweep_interval(),
        )));

        if let Some(listener) = self.control_listener {
            let app = control::router(ControlState {
                sessions: self.sessions.clone(),
                stats: self.stats.clone(),
                node_addr,
                remote_addr,
            });
            if let Ok(addr) = listener.local_addr() {
                log::info!("control endpoint listening on {}", addr);
            }
            tasks.push(tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    log::warn!("control endpoint exited: {}", e);
                }
            }));
        }

        log::info!(
            "gateway running: node side {}, remote side {}",
            node_addr,
            remote_addr
        );
        shutdown.await;
        log::info!("shutdown signal received, stopping listeners");

        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        log::info!(
            "gateway stopped ({} session(s) discarded)",
            self.sessions.len().await
        );
        Ok(())
    }
}

/// Periodically drop idle sessions. Holds the table lock only inside `sweep_expired`.
async fn run_sweeper(
    sessions: Arc<SessionTable>,
    stats: Arc<GatewayStats>,
    max_idle: Duration,
    every: Duration,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let removed = sessions.sweep_expired(max_idle).await;
        if removed > 0 {
            stats
                .sessions_expired
                .fetch_add(removed as u64, Ordering::Relaxed);
            log::debug!("expired {} idle session(s)", removed);
        }
    }
}

/// Run the gateway from config. Binds everything, then blocks until SIGINT/SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let gateway = Gateway::bind(config).await?;
    gateway.run(shutdown_signal()).await
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
