//! Lifecycle Coordinator
//!
//! One cancellation token, many named components. The first of {signal,
//! component exit} triggers cancellation; every component is then awaited
//! within the grace period.

use std::collections::HashMap;
use std::error::Error;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Component '{component}' failed: {reason}")]
    ComponentFailed {
        component: &'static str,
        reason: String,
    },

    #[error("Shutdown did not finish within {0:?}")]
    ShutdownTimedOut(Duration),
}

pub struct Coordinator {
    token: CancellationToken,
    components: JoinSet<Result<(), BoxError>>,
    names: HashMap<Id, &'static str>,
    grace: Duration,
}

impl Coordinator {
    pub fn new(grace: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            components: JoinSet::new(),
            names: HashMap::new(),
            grace,
        }
    }

    /// Components must stop once this token is cancelled
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn spawn<F, E>(&mut self, name: &'static str, component: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let handle = self
            .components
            .spawn(async move { component.await.map_err(Into::into) });
        self.names.insert(handle.id(), name);
        tracing::debug!(component = name, "Component started");
    }

    /// Serve until `signal` resolves or a component exits, then shut down
    ///
    /// A component failure wins over a shutdown timeout when both happen.
    pub async fn run<S>(mut self, signal: S) -> Result<(), LifecycleError>
    where
        S: Future<Output = ()>,
    {
        let mut failure = None;

        tokio::select! {
            _ = signal => {
                tracing::info!("Shutdown signal received");
            }
            _ = self.token.cancelled() => {
                tracing::info!("Shutdown requested");
            }
            Some(joined) = self.components.join_next_with_id() => {
                failure = settle(&self.names, joined, false);
            }
        }

        self.token.cancel();

        let names = &self.names;
        let components = &mut self.components;
        let drained = tokio::time::timeout(self.grace, async {
            while let Some(joined) = components.join_next_with_id().await {
                if let Some(err) = settle(names, joined, true) {
                    failure.get_or_insert(err);
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::error!(
                grace_secs = self.grace.as_secs(),
                remaining = self.components.len(),
                "Components did not stop in time; aborting"
            );
            self.components.abort_all();
            if failure.is_none() {
                return Err(LifecycleError::ShutdownTimedOut(self.grace));
            }
        }

        failure.map_or(Ok(()), Err)
    }
}

fn settle(
    names: &HashMap<Id, &'static str>,
    joined: Result<(Id, Result<(), BoxError>), JoinError>,
    stopping: bool,
) -> Option<LifecycleError> {
    let (id, outcome) = match joined {
        Ok((id, result)) => (id, result.map_err(|e| e.to_string())),
        Err(e) if e.is_cancelled() => return None,
        Err(e) => (e.id(), Err(format!("panicked: {e}"))),
    };
    let component = names.get(&id).copied().unwrap_or("unknown");

    match outcome {
        Ok(()) if stopping => {
            tracing::info!(component, "Component stopped");
            None
        }
        Ok(()) => {
            tracing::error!(component, "Component exited before shutdown");
            Some(LifecycleError::ComponentFailed {
                component,
                reason: "exited before shutdown".to_string(),
            })
        }
        Err(reason) => {
            tracing::error!(component, error = %reason, "Component failed");
            Some(LifecycleError::ComponentFailed { component, reason })
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
