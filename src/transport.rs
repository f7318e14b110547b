//! Streaming color-control transport
//!
//! Panel writes are coalesced into a pending set (latest write per panel wins) and
//! flushed as a single UDP datagram on a fixed period. Delivery is best effort: a batch
//! that fails to send is logged and dropped, never retried.

use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{net::UdpSocket, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    color::Rgb8,
    task::{Task, TaskError},
    PanelId,
};

mod codec;
pub use codec::*;

#[cfg(test)]
pub(crate) mod recording;

/// Period of the flush loop
pub const FLUSH_PERIOD: Duration = Duration::from_millis(100);

/// Deadline used when the transport is closed through [PanelWriter::close]
const CLOSE_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Destination of panel color writes
#[async_trait]
pub trait PanelWriter: Send + Sync {
    /// Queue a color for a panel. Never blocks, and silently does nothing if the writer
    /// is not running.
    fn submit(&self, panel: PanelId, color: Rgb8);

    /// Flush what is pending and release the writer
    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// State shared between submitters and the flush loop
#[derive(Debug, Default)]
struct Shared {
    pending: PendingCommands,
    alive: bool,
    dropped: usize,
}

type SharedState = Arc<Mutex<Shared>>;

fn lock(shared: &SharedState) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [PanelWriter] streaming datagrams to the device
pub struct CommandTransport {
    remote_addr: SocketAddr,
    shared: SharedState,
    task: tokio::sync::Mutex<Option<Task>>,
}

impl CommandTransport {
    /// Bind a local socket towards `remote_addr` and start the flush loop
    pub async fn start(remote_addr: SocketAddr) -> Result<Self, TransportError> {
        Self::start_with_period(remote_addr, FLUSH_PERIOD).await
    }

    pub async fn start_with_period(
        remote_addr: SocketAddr,
        period: Duration,
    ) -> Result<Self, TransportError> {
        // Choose correct IP version for local addr
        let local_addr: SocketAddr = if remote_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local_addr).await?;
        socket.connect(remote_addr).await?;

        let shared = Arc::new(Mutex::new(Shared {
            pending: PendingCommands::new(),
            alive: true,
            dropped: 0,
        }));

        let task = Task::spawn("transport", {
            let shared = shared.clone();
            move |token| flush_loop(socket, remote_addr, shared, period, token)
        });

        info!(remote = %remote_addr, "command transport started");

        Ok(Self {
            remote_addr,
            shared,
            task: tokio::sync::Mutex::new(Some(task)),
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn is_alive(&self) -> bool {
        lock(&self.shared).alive
    }

    /// Number of panels waiting for the next flush
    pub fn pending(&self) -> usize {
        lock(&self.shared).pending.len()
    }

    /// Number of batches lost to send failures
    pub fn dropped_batches(&self) -> usize {
        lock(&self.shared).dropped
    }

    /// Stop the flush loop and wait at most `deadline` for it to exit
    ///
    /// Writes submitted before the call are sent in a final flush; later writes are
    /// ignored.
    pub async fn stop(&self, deadline: Duration) -> Result<(), TransportError> {
        lock(&self.shared).alive = false;

        let mut task = self.task.lock().await;
        if let Some(running) = task.as_mut() {
            running.stop(deadline).await?;
            *task = None;
        }

        Ok(())
    }
}

#[async_trait]
impl PanelWriter for CommandTransport {
    fn submit(&self, panel: PanelId, color: Rgb8) {
        let mut shared = lock(&self.shared);
        if shared.alive {
            shared.pending.set(panel, color);
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.stop(CLOSE_DEADLINE).await
    }
}

impl std::fmt::Debug for CommandTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTransport")
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

#[instrument(skip(socket, shared, token))]
async fn flush_loop(
    socket: UdpSocket,
    remote_addr: SocketAddr,
    shared: SharedState,
    period: Duration,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buffer = Vec::new();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                flush(&socket, &shared, &mut buffer).await;
            }
        }
    }

    // Drain what was submitted before the stop
    let count = flush(&socket, &shared, &mut buffer).await;
    info!(count = %count, "stopping command transport");
}

/// Send the pending set as one datagram. Returns the number of panels in the batch.
async fn flush(socket: &UdpSocket, shared: &SharedState, buffer: &mut Vec<u8>) -> usize {
    let batch = lock(shared).pending.take();
    if batch.is_empty() {
        return 0;
    }

    batch.encode(buffer);
    trace!(count = %batch.len(), "publishing commands");

    if let Err(error) = socket.send(buffer).await {
        // The batch is lost, the next tick starts from an empty set
        error!(error = %error, count = %batch.len(), "sending datagram failed");
        lock(shared).dropped += 1;
    }

    batch.len()
}
