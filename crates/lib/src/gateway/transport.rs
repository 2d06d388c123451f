//! Datagram transport boundary: receive one datagram, send one datagram to an address.

use crate::error::GatewayError;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// One datagram endpoint. The pipeline and listeners only see this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Wait for the next datagram; returns its length in `buf` and the sender.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    async fn send(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<usize>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Transport for UdpSocket {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buf).await
    }

    async fn send(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.send_to(bytes, dest).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Send with a per-attempt timeout, retrying up to `retries` more times.
pub async fn send_with_retry(
    transport: &dyn Transport,
    bytes: &[u8],
    dest: SocketAddr,
    timeout: Duration,
    retries: u32,
) -> Result<(), GatewayError> {
    let attempts = retries.saturating_add(1);
    let mut last_err = io::Error::new(io::ErrorKind::Other, "send not attempted");
    for attempt in 1..=attempts {
        match tokio::time::timeout(timeout, transport.send(bytes, dest)).await {
            Ok(Ok(_)) => return Ok(()),
            Ok(Err(e)) => {
                log::debug!("send to {} attempt {}/{} failed: {}", dest, attempt, attempts, e);
                last_err = e;
            }
            Err(_) => {
                log::debug!("send to {} attempt {}/{} timed out", dest, attempt, attempts);
                last_err = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("send timed out after {:?}", timeout),
                );
            }
        }
    }
    Err(GatewayError::TransportFailure {
        dest,
        attempts,
        source: last_err,
    })
}
