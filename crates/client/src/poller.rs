//! Research status poller.
//!
//! One background task per watched job, fetching the merged snapshot
//! on a fixed cadence and publishing it over a watch channel. Polls
//! are inherently single-flight (the next request starts only after
//! the previous one resolved), fetch failures stretch the cadence to
//! the backoff interval, and a response whose research cursor is
//! behind the last published one is discarded as stale. The task ends
//! on its own once the run reaches a terminal status.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use epistle_core::snapshot::JobSnapshot;

use crate::api::{ApiError, LetterApiClient};

/// Source of merged status snapshots.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<JobSnapshot, ApiError>;
}

#[async_trait]
impl StatusSource for LetterApiClient {
    async fn fetch(&self) -> Result<JobSnapshot, ApiError> {
        self.research_status().await
    }
}

/// Polling cadence.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between successful polls.
    pub interval: Duration,
    /// Delay after a failed poll.
    pub backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            backoff: Duration::from_secs(8),
        }
    }
}

/// Polls research status until the run terminates or is cancelled.
pub struct StatusPoller<T> {
    source: T,
    config: PollerConfig,
    on_error: Option<Box<dyn Fn(&ApiError) + Send + Sync>>,
}

impl<T: StatusSource> StatusPoller<T> {
    pub fn new(source: T, config: PollerConfig) -> Self {
        Self {
            source,
            config,
            on_error: None,
        }
    }

    /// Advisory hook invoked on every failed poll (for surfacing a
    /// "connection lost, retrying" notice); polling continues either
    /// way.
    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&ApiError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    /// Spawn the polling task. The receiver holds the latest accepted
    /// snapshot (`None` until the first successful poll); the task
    /// exits when the run terminates, the job has no research state,
    /// or `cancel` fires.
    pub fn spawn(
        self,
        cancel: CancellationToken,
    ) -> (watch::Receiver<Option<JobSnapshot>>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(async move {
            let mut last_cursor: u64 = 0;
            loop {
                let delay = match self.source.fetch().await {
                    Ok(snapshot) => {
                        let Some(run) = snapshot.research.as_ref() else {
                            tracing::debug!("No research run on snapshot, poller done");
                            let _ = tx.send(Some(snapshot));
                            return;
                        };
                        if run.cursor < last_cursor {
                            // Out-of-order response from a slower
                            // request path; the published state is
                            // already newer.
                            tracing::debug!(
                                cursor = run.cursor,
                                last_cursor,
                                "Discarding stale research status"
                            );
                            self.config.interval
                        } else {
                            last_cursor = run.cursor;
                            let terminal = run.status.is_terminal();
                            let _ = tx.send(Some(snapshot));
                            if terminal {
                                return;
                            }
                            self.config.interval
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Research status poll failed, backing off");
                        if let Some(handler) = &self.on_error {
                            handler(&e);
                        }
                        self.config.backoff
                    }
                };

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        });
        (rx, handle)
    }
}
