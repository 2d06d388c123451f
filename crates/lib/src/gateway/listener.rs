//! Receive loop for one direction: every datagram is handed to a worker task.

use crate::gateway::pipeline::{Direction, Pipeline};
use crate::gateway::stats::bump;
use crate::gateway::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Pause after a failed receive so a persistently broken socket does not spin.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);

pub struct Listener {
    direction: Direction,
    transport: Arc<dyn Transport>,
    pipeline: Arc<Pipeline>,
    workers: Arc<Semaphore>,
    max_datagram: usize,
}

impl Listener {
    pub fn new(
        direction: Direction,
        transport: Arc<dyn Transport>,
        pipeline: Arc<Pipeline>,
        max_in_flight: usize,
        max_datagram: usize,
    ) -> Self {
        Self {
            direction,
            transport,
            pipeline,
            workers: Arc::new(Semaphore::new(max_in_flight)),
            max_datagram,
        }
    }

    /// Receive until the task is aborted. Receive errors are logged and the loop continues.
    pub async fn run(self) {
        match self.transport.local_addr() {
            Ok(addr) => log::info!("{} listener receiving on {}", self.direction, addr),
            Err(e) => log::debug!("{} listener local_addr unavailable: {}", self.direction, e),
        }
        // One spare byte: a datagram that fills it is longer than the limit.
        let mut buf = vec![0u8; self.max_datagram + 1];
        loop {
            let (len, sender) = match self.transport.recv(&mut buf).await {
                Ok(r) => r,
                Err(e) => {
                    log::warn!("{} listener: receive failed: {}", self.direction, e);
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                    continue;
                }
            };
            if len > self.max_datagram {
                log::warn!(
                    "{} listener: dropped {}+ byte datagram from {}, limit {}",
                    self.direction,
                    len,
                    sender,
                    self.max_datagram
                );
                bump(&self.pipeline.stats().dropped_oversized);
                continue;
            }
            // Waits only when max_in_flight frames are already being processed.
            let Ok(permit) = self.workers.clone().acquire_owned().await else {
                break;
            };
            let datagram = buf[..len].to_vec();
            let pipeline = self.pipeline.clone();
            let direction = self.direction;
            tokio::spawn(async move {
                // Failures are already logged and counted by the pipeline.
                let _ = pipeline.process(direction, &datagram, sender).await;
                drop(permit);
            });
        }
        log::info!("{} listener stopped", self.direction);
    }
}
