use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{HandoffSender, PollError, StatusMap, StatusSource};
use crate::models::PollSettings;

/// Periodically reads the status source and hands each document to the updater
///
/// Failed reads are logged and skipped. Handing a document over waits for the updater to
/// take it, so a busy updater delays the next poll.
pub struct Poller<S> {
    source: S,
    interval: Duration,
    timeout: Duration,
    tx: HandoffSender,
}

impl<S: StatusSource> Poller<S> {
    pub fn new(source: S, settings: &PollSettings, tx: HandoffSender) -> Self {
        Self {
            source,
            interval: settings.interval(),
            timeout: settings.timeout(),
            tx,
        }
    }

    /// Override the configured poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    async fn poll(&self) -> Result<StatusMap, PollError> {
        tokio::time::timeout(self.timeout, self.source.fetch())
            .await
            .map_err(|_| PollError::Timeout(self.timeout))?
    }

    #[instrument(skip_all)]
    pub async fn run(self, token: CancellationToken) {
        info!(interval = ?self.interval, "poller starting");

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let map = match self.poll().await {
                        Ok(map) => map,
                        Err(error) => {
                            warn!(error = %error, "polling status failed");
                            continue;
                        }
                    };

                    debug!(entries = %map.len(), "polled status");

                    tokio::select! {
                        _ = token.cancelled() => break,
                        result = self.tx.send(map) => {
                            if result.is_err() {
                                debug!("updater is gone");
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!("poller stopped");
    }
}
