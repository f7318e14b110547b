use std::{collections::BTreeSet, sync::Arc, time::Duration};

use parse_display::Display;
use tokio_util::sync::CancellationToken;

use super::{HandoffReceiver, StatusMap};
use crate::{models::ValidateSettings, registry::Registry};

/// Bound on a single registry update
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// A status reported for a thing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Display)]
#[display("{thing}={status}")]
pub struct StatusUpdate {
    pub thing: String,
    pub status: String,
}

/// Validates status documents and forwards them to the registry
pub struct Updater {
    registry: Arc<Registry>,
    validate: ValidateSettings,
    rx: HandoffReceiver,
}

impl Updater {
    pub fn new(
        registry: Arc<Registry>,
        validate: ValidateSettings,
        rx: HandoffReceiver,
    ) -> Self {
        Self {
            registry,
            validate,
            rx,
        }
    }

    /// Keep the entries that name both a known thing and a known status
    ///
    /// Unknown entries are always dropped. The validate settings only control whether
    /// they are reported.
    pub fn filter(&self, map: &StatusMap) -> Vec<StatusUpdate> {
        let mut unknown_things = BTreeSet::new();
        let mut unknown_statuses = BTreeSet::new();
        let mut updates = Vec::with_capacity(map.len());

        for (thing, status) in map {
            let known_thing = self.registry.knows_thing(thing);
            let known_status = self.registry.knows_status(status);

            if !known_thing {
                unknown_things.insert(thing.as_str());
            }

            if !known_status {
                unknown_statuses.insert(status.as_str());
            }

            if known_thing && known_status {
                updates.push(StatusUpdate {
                    thing: thing.clone(),
                    status: status.clone(),
                });
            }
        }

        if self.validate.thing && !unknown_things.is_empty() {
            warn!(things = ?unknown_things, "status document references unknown things");
        }

        if self.validate.status && !unknown_statuses.is_empty() {
            warn!(statuses = ?unknown_statuses, "status document references unknown statuses");
        }

        updates.sort();
        updates
    }

    /// Forward every valid entry of `map`, one at a time
    pub async fn apply(&self, map: &StatusMap) {
        for update in self.filter(map) {
            match tokio::time::timeout(
                FORWARD_TIMEOUT,
                self.registry.update_thing(&update.thing, &update.status),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    error!(update = %update, error = %error, "failed to update thing")
                }
                Err(_) => error!(update = %update, "timed out updating thing"),
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn run(mut self, token: CancellationToken) {
        info!("updater starting");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                map = self.rx.recv() => match map {
                    Some(map) => {
                        debug!(entries = %map.len(), "received status");
                        self.apply(&map).await;
                    }
                    None => {
                        debug!("poller is gone");
                        break;
                    }
                },
            }
        }

        info!("updater stopped");
    }
}
