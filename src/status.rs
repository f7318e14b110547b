//! Status pipeline
//!
//! The [Poller] reads the status source on an interval and hands every document over a
//! rendezvous channel to the [Updater], which validates it against the registry and
//! forwards the known `(thing, status)` pairs.

use std::{collections::HashMap, time::Duration};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

mod poller;
pub use poller::*;

mod source;
pub use source::*;

mod updater;
pub use updater::*;

/// Status document: thing name to status name
pub type StatusMap = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("status source returned {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid status document: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no status within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
#[error("status receiver is gone")]
pub struct HandoffClosed;

#[derive(Debug)]
struct Handoff {
    map: StatusMap,
    accepted: oneshot::Sender<()>,
}

/// Sending half of the poller to updater channel
#[derive(Debug, Clone)]
pub struct HandoffSender(mpsc::Sender<Handoff>);

impl HandoffSender {
    /// Hand `map` over, returning once the receiver has taken it
    pub async fn send(&self, map: StatusMap) -> Result<(), HandoffClosed> {
        let (accepted, taken) = oneshot::channel();

        self.0
            .send(Handoff { map, accepted })
            .await
            .map_err(|_| HandoffClosed)?;

        taken.await.map_err(|_| HandoffClosed)
    }
}

/// Receiving half of the poller to updater channel
#[derive(Debug)]
pub struct HandoffReceiver(mpsc::Receiver<Handoff>);

impl HandoffReceiver {
    /// Take the next document, releasing its sender. Returns `None` once all senders are
    /// gone.
    pub async fn recv(&mut self) -> Option<StatusMap> {
        let Handoff { map, accepted } = self.0.recv().await?;
        // The sender may have been cancelled meanwhile
        let _ = accepted.send(());
        Some(map)
    }
}

/// Unbuffered channel between the poller and the updater
///
/// A send completes only when the receiver takes the document, so a busy updater holds
/// the poller back.
pub fn handoff() -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (HandoffSender(tx), HandoffReceiver(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(thing: &str, status: &str) -> StatusMap {
        vec![(thing.to_owned(), status.to_owned())].into_iter().collect()
    }

    #[tokio::test]
    async fn send_waits_for_receiver() {
        let (tx, mut rx) = handoff();

        let send = tokio::spawn(async move { tx.send(map("lb", "ok")).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!send.is_finished());

        assert_eq!(rx.recv().await, Some(map("lb", "ok")));
        send.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn send_fails_without_receiver() {
        let (tx, rx) = handoff();
        drop(rx);

        assert!(tx.send(map("lb", "ok")).await.is_err());
    }

    #[tokio::test]
    async fn recv_ends_without_sender() {
        let (tx, mut rx) = handoff();
        drop(tx);

        assert_eq!(rx.recv().await, None);
    }
}
