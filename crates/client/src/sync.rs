//! Debounced snapshot synchronization.
//!
//! Edits are queued locally and flushed to the server after a quiet
//! period, so rapid typing collapses into one write. A payload whose
//! signature matches the last successful persist is skipped entirely,
//! and at most one save is in flight at a time; a newer queued edit
//! always supersedes an older unflushed one.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use epistle_core::snapshot::{JobSnapshot, SnapshotPayload};
use epistle_core::types::JobId;

use crate::api::{ApiError, LetterApiClient};

/// Persistence boundary for the sync engine.
#[async_trait]
pub trait SaveTarget: Send + Sync + 'static {
    async fn load(&self) -> Result<Option<JobSnapshot>, ApiError>;
    async fn save(&self, payload: &SnapshotPayload) -> Result<JobSnapshot, ApiError>;
    async fn discard(&self) -> Result<(), ApiError>;
}

#[async_trait]
impl SaveTarget for LetterApiClient {
    async fn load(&self) -> Result<Option<JobSnapshot>, ApiError> {
        self.get_job().await
    }

    async fn save(&self, payload: &SnapshotPayload) -> Result<JobSnapshot, ApiError> {
        self.save_job(payload).await
    }

    async fn discard(&self) -> Result<(), ApiError> {
        self.delete_job().await
    }
}

/// Tunables for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after the last edit before a flush.
    pub debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
        }
    }
}

#[derive(Default)]
struct SyncState {
    pending: Option<SnapshotPayload>,
    /// Signature of the last payload the server confirmed.
    last_signature: Option<String>,
    job_id: Option<JobId>,
    debounce_cancel: Option<CancellationToken>,
}

struct Inner<T> {
    target: T,
    config: SyncConfig,
    state: Mutex<SyncState>,
    // Serializes saves so a slow flush and a manual flush_now cannot
    // write out of order.
    save_gate: tokio::sync::Mutex<()>,
}

/// Debounced autosave engine over a [`SaveTarget`].
pub struct SyncEngine<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SyncEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SaveTarget> SyncEngine<T> {
    pub fn new(target: T, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                target,
                config,
                state: Mutex::new(SyncState::default()),
                save_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Fetch the stored snapshot, seeding the dedup signature so that
    /// resuming does not immediately re-save identical content.
    ///
    /// Returns `None` when nothing is stored or the snapshot holds no
    /// content worth resuming.
    pub async fn load(&self) -> Result<Option<JobSnapshot>, ApiError> {
        let Some(snapshot) = self.inner.target.load().await? else {
            return Ok(None);
        };
        {
            let mut state = self.inner.state.lock().unwrap();
            state.job_id = Some(snapshot.job_id);
            state.last_signature =
                Some(snapshot.payload().signature(Some(snapshot.job_id)));
        }
        if snapshot.is_empty() {
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    /// Queue an edited payload; it will flush after the quiet period.
    /// A newer queue replaces an older unflushed payload and restarts
    /// the timer.
    pub fn note_edit(&self, payload: SnapshotPayload) {
        let token = CancellationToken::new();
        {
            let mut state = self.inner.state.lock().unwrap();
            state.pending = Some(payload);
            if let Some(previous) = state.debounce_cancel.replace(token.clone()) {
                previous.cancel();
            }
        }

        let inner = Arc::clone(&self.inner);
        let debounce = self.inner.config.debounce;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(debounce) => {
                    if let Err(e) = flush(&inner).await {
                        // The payload stays pending; a later edit or
                        // the shutdown flush retries it.
                        tracing::warn!(error = %e, "Debounced save failed");
                    }
                }
            }
        });
    }

    /// Flush any pending payload immediately. Returns the persisted
    /// snapshot, or `None` when there was nothing (new) to write.
    pub async fn flush_now(&self) -> Result<Option<JobSnapshot>, ApiError> {
        self.cancel_debounce();
        flush(&self.inner).await
    }

    /// Drop the local state and delete the stored job.
    pub async fn discard(&self) -> Result<(), ApiError> {
        self.cancel_debounce();
        {
            let mut state = self.inner.state.lock().unwrap();
            state.pending = None;
            state.last_signature = None;
            state.job_id = None;
        }
        self.inner.target.discard().await
    }

    /// Flush outstanding edits before the engine goes away.
    pub async fn shutdown(&self) -> Result<Option<JobSnapshot>, ApiError> {
        self.flush_now().await
    }

    fn cancel_debounce(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(token) = state.debounce_cancel.take() {
            token.cancel();
        }
    }
}

async fn flush<T: SaveTarget>(inner: &Arc<Inner<T>>) -> Result<Option<JobSnapshot>, ApiError> {
    let _gate = inner.save_gate.lock().await;

    let (payload, job_id) = {
        let mut state = inner.state.lock().unwrap();
        let Some(payload) = state.pending.take() else {
            return Ok(None);
        };
        (payload, state.job_id)
    };

    let signature = payload.signature(job_id);
    {
        let state = inner.state.lock().unwrap();
        if state.last_signature.as_deref() == Some(signature.as_str()) {
            tracing::debug!("Skipping save, payload unchanged since last persist");
            return Ok(None);
        }
    }

    match inner.target.save(&payload).await {
        Ok(snapshot) => {
            let mut state = inner.state.lock().unwrap();
            state.job_id = Some(snapshot.job_id);
            state.last_signature = Some(payload.signature(Some(snapshot.job_id)));
            Ok(Some(snapshot))
        }
        Err(e) => {
            let mut state = inner.state.lock().unwrap();
            // Restore for retry unless a newer edit superseded us
            // while the request was in flight.
            if state.pending.is_none() {
                state.pending = Some(payload);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockTarget {
        saves: Mutex<Vec<SnapshotPayload>>,
        save_count: AtomicUsize,
        discards: AtomicUsize,
        fail_next_save: AtomicBool,
        stored: Mutex<Option<JobSnapshot>>,
    }

    #[async_trait]
    impl SaveTarget for Arc<MockTarget> {
        async fn load(&self) -> Result<Option<JobSnapshot>, ApiError> {
            Ok(self.stored.lock().unwrap().clone())
        }

        async fn save(&self, payload: &SnapshotPayload) -> Result<JobSnapshot, ApiError> {
            if self.fail_next_save.swap(false, Ordering::SeqCst) {
                return Err(ApiError::Api {
                    status: 503,
                    code: None,
                    message: "unavailable".into(),
                });
            }
            self.save_count.fetch_add(1, Ordering::SeqCst);
            self.saves.lock().unwrap().push(payload.clone());

            let mut stored = self.stored.lock().unwrap();
            let snapshot = stored.get_or_insert_with(|| {
                JobSnapshot::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4())
            });
            snapshot.apply_payload(payload);
            Ok(snapshot.clone())
        }

        async fn discard(&self) -> Result<(), ApiError> {
            self.discards.fetch_add(1, Ordering::SeqCst);
            *self.stored.lock().unwrap() = None;
            Ok(())
        }
    }

    fn engine() -> (SyncEngine<Arc<MockTarget>>, Arc<MockTarget>) {
        let target = Arc::new(MockTarget::default());
        (
            SyncEngine::new(Arc::clone(&target), SyncConfig::default()),
            target,
        )
    }

    fn payload(issue: &str) -> SnapshotPayload {
        SnapshotPayload {
            form: epistle_core::intake::IntakeForm {
                issue: issue.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_collapse_into_one_save() {
        let (engine, target) = engine();
        // Yield after each edit so the debounce timer registers at the
        // current virtual time before the clock advances.
        engine.note_edit(payload("d"));
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(100)).await;
        engine.note_edit(payload("dr"));
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(100)).await;
        engine.note_edit(payload("draft"));
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;

        assert_eq!(target.save_count.load(Ordering::SeqCst), 1);
        assert_eq!(target.saves.lock().unwrap()[0].form.issue, "draft");
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_flushes_before_the_quiet_period() {
        let (engine, target) = engine();
        engine.note_edit(payload("early"));
        // Register the debounce timer before advancing the clock.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;
        assert_eq!(target.save_count.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert_eq!(target.save_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn identical_payload_is_saved_once() {
        let (engine, target) = engine();
        engine.note_edit(payload("same"));
        engine.flush_now().await.unwrap();
        engine.note_edit(payload("same"));
        let second = engine.flush_now().await.unwrap();

        assert_eq!(second, None);
        assert_eq!(target.save_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resume_does_not_resave_unchanged_content() {
        let (engine, target) = engine();
        engine.note_edit(payload("resumable"));
        engine.flush_now().await.unwrap();

        // A second session loads the same snapshot and re-queues it
        // verbatim, as a client does after a resume prompt.
        let (engine2, _) = {
            let e = SyncEngine::new(Arc::clone(&target), SyncConfig::default());
            (e, ())
        };
        let snapshot = engine2.load().await.unwrap().unwrap();
        engine2.note_edit(snapshot.payload());
        assert_eq!(engine2.flush_now().await.unwrap(), None);
        assert_eq!(target.save_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn load_skips_empty_snapshots() {
        let (engine, target) = engine();
        *target.stored.lock().unwrap() = Some(JobSnapshot::new(
            uuid::Uuid::new_v4(),
            uuid::Uuid::new_v4(),
        ));
        assert_eq!(engine.load().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn discard_drops_pending_and_deletes() {
        let (engine, target) = engine();
        engine.note_edit(payload("doomed"));
        engine.discard().await.unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert_eq!(target.save_count.load(Ordering::SeqCst), 0);
        assert_eq!(target.discards.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_edits() {
        let (engine, target) = engine();
        engine.note_edit(payload("last words"));
        // Well before the debounce fires.
        tokio::time::advance(Duration::from_millis(50)).await;
        let flushed = engine.shutdown().await.unwrap().unwrap();

        assert_eq!(flushed.form.issue, "last words");
        assert_eq!(target.save_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_save_is_retried_on_next_flush() {
        let (engine, target) = engine();
        target.fail_next_save.store(true, Ordering::SeqCst);
        engine.note_edit(payload("persistent"));
        assert!(engine.flush_now().await.is_err());

        // The payload survived the failure and flushes cleanly now.
        let saved = engine.flush_now().await.unwrap().unwrap();
        assert_eq!(saved.form.issue, "persistent");
        assert_eq!(target.save_count.load(Ordering::SeqCst), 1);
    }
}
