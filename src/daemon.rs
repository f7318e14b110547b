//! Process-level lifecycle
//!
//! [Daemon::start] brings the pipeline up and [Daemon::shutdown] tears it down in an
//! order that guarantees no action writes to a transport that has already exited: stop
//! the poller and updater, stop every action (painting the `onstop` colors), then close
//! the writer.

use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    actions::{ActionError, SolidFill},
    color::{Color, ColorError},
    models::Config,
    registry::{Registry, RegistryError},
    status::{handoff, Poller, StatusSource, Updater},
    task::{Supervisor, TaskError},
    transport::{PanelWriter, TransportError},
    PanelId,
};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("invalid color: {0}")]
    Color(#[from] ColorError),
}

/// Fill every panel of the device with one color
pub fn clear_panels(
    writer: Arc<dyn PanelWriter>,
    panels: Vec<PanelId>,
    hex: &str,
) -> Result<(), DaemonError> {
    let color = Color::from_hex(hex)?;
    info!(color = %color, panels = %panels.len(), "clearing panels");

    SolidFill::new(writer, panels, color)?.start();
    Ok(())
}

/// The running status pipeline
pub struct Daemon {
    registry: Arc<Registry>,
    writer: Arc<dyn PanelWriter>,
    supervisor: Supervisor,
}

impl Daemon {
    /// Build the registry, paint the `onstart` colors and spawn the poller and updater
    pub async fn start<S>(
        config: &Config,
        writer: Arc<dyn PanelWriter>,
        source: S,
    ) -> Result<Self, DaemonError>
    where
        S: StatusSource + 'static,
    {
        let registry = Arc::new(Registry::new(
            &config.things,
            config.statuses.clone(),
            writer.clone(),
        )?);

        registry.start_all().await?;

        let (tx, rx) = handoff();
        let poller = Poller::new(source, &config.poll, tx);
        let updater = Updater::new(registry.clone(), config.validate, rx);

        let mut supervisor = Supervisor::new();
        supervisor.spawn("poller", move |token| poller.run(token));
        supervisor.spawn("updater", move |token| updater.run(token));

        info!(things = %config.things.len(), "daemon started");

        Ok(Self {
            registry,
            writer,
            supervisor,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Run the shutdown sequence, each step bounded by `deadline`
    ///
    /// A failing step is logged and the sequence continues; the first error is returned.
    pub async fn shutdown(mut self, deadline: Duration) -> Result<(), DaemonError> {
        let mut first_error: Option<DaemonError> = None;

        info!("stopping status pipeline");
        if let Err(error) = self.supervisor.shutdown(deadline).await {
            error!(error = %error, "failed to stop status pipeline");
            first_error.get_or_insert(error.into());
        }

        info!("stopping things");
        if let Err(error) = self.registry.stop_all(deadline).await {
            error!(error = %error, "failed to stop things");
            first_error.get_or_insert(error.into());
        }

        info!("closing panel writer");
        if let Err(error) = self.writer.close().await {
            error!(error = %error, "failed to close panel writer");
            first_error.get_or_insert(error.into());
        }

        match first_error {
            Some(error) => Err(error),
            None => {
                info!("daemon stopped");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("registry", &self.registry)
            .field("supervisor", &self.supervisor)
            .finish()
    }
}
