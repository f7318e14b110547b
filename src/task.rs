//! Cancellable background tasks
//!
//! Every long-running loop (transport flush, breath animations, status poller and
//! updater) is a [Task]: a spawned future that receives a [CancellationToken], watches it
//! at each of its suspension points and exits cooperatively. Stopping a task cancels its
//! token and joins it within a deadline; tasks are never aborted forcefully.

use std::{future::Future, time::Duration};

use futures::FutureExt;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task '{name}' did not stop within {deadline:?}")]
    Timeout {
        name: &'static str,
        deadline: Duration,
    },
    #[error("task '{name}' failed: {source}")]
    Join {
        name: &'static str,
        #[source]
        source: JoinError,
    },
}

pub struct Task {
    name: &'static str,
    token: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl Task {
    /// Spawn a new task on the current runtime
    ///
    /// # Parameters
    ///
    /// * `name`: name of the task, for diagnostics
    /// * `f`: builds the task future from its cancellation token
    pub fn spawn<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_with_token(name, CancellationToken::new(), f)
    }

    fn spawn_with_token<F, Fut>(name: &'static str, token: CancellationToken, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let join_handle = tokio::spawn(f(token.clone()));
        trace!(task = name, "spawned task");

        Self {
            name,
            token,
            join_handle: Some(join_handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ask the task to stop, without waiting for it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Wait for the task to complete, without cancelling it
    pub async fn join(&mut self) -> Result<(), TaskError> {
        if let Some(join_handle) = self.join_handle.as_mut() {
            let result = join_handle.await;
            self.join_handle = None;

            result.map_err(|source| TaskError::Join {
                name: self.name,
                source,
            })?;
        }

        Ok(())
    }

    /// Cancel the task and wait at most `deadline` for it to exit
    ///
    /// On timeout the task stays cancelled and will exit at its next suspension point;
    /// calling `stop` again waits for it once more.
    pub async fn stop(&mut self, deadline: Duration) -> Result<(), TaskError> {
        self.cancel();

        let timeout = TaskError::Timeout {
            name: self.name,
            deadline,
        };

        // A zero deadline only checks whether the task is already done
        if deadline.is_zero() {
            return self.join().now_or_never().unwrap_or(Err(timeout));
        }

        match tokio::time::timeout(deadline, self.join()).await {
            Ok(result) => {
                trace!(task = self.name, "task stopped");
                result
            }
            Err(_) => Err(timeout),
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        // A discarded task must not outlive its handle
        self.token.cancel();
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Shutdown broadcast plus join barrier for a set of tasks
///
/// All tasks spawned through a supervisor receive a child of its token, so a single
/// [Supervisor::shutdown] signals all of them at once.
#[derive(Debug, Default)]
pub struct Supervisor {
    token: CancellationToken,
    tasks: Vec<Task>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn spawn<F, Fut>(&mut self, name: &'static str, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = Task::spawn_with_token(name, self.token.child_token(), f);
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Broadcast the stop signal and join every task, each within `deadline`
    ///
    /// All tasks are joined even if some fail; the first error is returned.
    pub async fn shutdown(&mut self, deadline: Duration) -> Result<(), TaskError> {
        self.token.cancel();

        let results =
            futures::future::join_all(self.tasks.iter_mut().map(|task| task.stop(deadline)))
                .await;

        let mut first_error = None;
        for (task, result) in self.tasks.iter().zip(results) {
            match result {
                Ok(()) => debug!(task = task.name(), "joined task"),
                Err(error) => {
                    error!(task = task.name(), error = %error, "failed to join task");
                    first_error.get_or_insert(error);
                }
            }
        }

        self.tasks.retain(|task| !task.is_finished());

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
