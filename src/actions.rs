//! Rendering actions
//!
//! An [Action] renders one status on a set of panels. Every action follows the same
//! lifecycle: it is constructed, started once, and stopped within a deadline. One-shot
//! actions render synchronously in `start`; continuous ones run a background [Task]
//! which `stop` joins before returning.
//!
//! [Task]: crate::task::Task

use std::time::Duration;

use strum_macros::IntoStaticStr;
use thiserror::Error;

use crate::{color::ColorError, task::TaskError};

mod breath;
pub use breath::*;

mod solid;
pub use solid::*;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid color: {0}")]
    Color(#[from] ColorError),
    #[error("failed to stop {action} action: {source}")]
    Stop {
        action: &'static str,
        #[source]
        source: TaskError,
    },
}

#[derive(Debug, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    /// Placeholder until a panel group receives its first status
    NoOp,
    SolidFill(SolidFill),
    Breath(Breath),
}

impl Default for Action {
    fn default() -> Self {
        Self::NoOp
    }
}

impl Action {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Start rendering. Starting an action more than once has no further effect.
    pub async fn start(&self) -> Result<(), ActionError> {
        match self {
            Self::NoOp => Ok(()),
            Self::SolidFill(fill) => {
                fill.start();
                Ok(())
            }
            Self::Breath(breath) => {
                breath.start().await;
                Ok(())
            }
        }
    }

    /// Stop rendering, waiting at most `deadline` for background work to exit
    pub async fn stop(&self, deadline: Duration) -> Result<(), ActionError> {
        debug!(action = self.name(), "stopping");

        match self {
            Self::NoOp | Self::SolidFill(_) => Ok(()),
            Self::Breath(breath) => breath
                .stop(deadline)
                .await
                .map_err(|source| ActionError::Stop {
                    action: self.name(),
                    source,
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        color::{Color, Rgb8},
        transport::recording::RecordingWriter,
    };

    #[test]
    fn names() {
        assert_eq!(Action::NoOp.name(), "no_op");
        assert_eq!(Action::default().name(), "no_op");
    }

    #[tokio::test]
    async fn noop_does_nothing() {
        let action = Action::NoOp;
        action.start().await.unwrap();
        action.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn solid_fill_writes_each_panel_once() {
        let writer = Arc::new(RecordingWriter::new());
        let color = Color::from_hex("#102030").unwrap();
        let action = Action::SolidFill(SolidFill::new(writer.clone(), vec![1, 4, 9], color).unwrap());

        action.start().await.unwrap();
        action.start().await.unwrap();
        action.stop(Duration::from_secs(1)).await.unwrap();

        assert_eq!(
            writer.writes(),
            vec![
                (1, Rgb8::new(0x10, 0x20, 0x30)),
                (4, Rgb8::new(0x10, 0x20, 0x30)),
                (9, Rgb8::new(0x10, 0x20, 0x30)),
            ]
        );
    }

    #[tokio::test]
    async fn breath_stop_joins_loop() {
        let writer = Arc::new(RecordingWriter::new());
        let breath = Breath::new(
            writer.clone(),
            vec![2],
            Color::from_hex("#000000").unwrap(),
            Color::from_hex("#ffffff").unwrap(),
            1,
        )
        .unwrap();
        let action = Action::Breath(breath);

        action.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(180)).await;
        action.stop(Duration::from_secs(1)).await.unwrap();

        let count = writer.len();
        assert!(count >= 2, "only {} frames rendered", count);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(writer.len(), count);
    }
}
