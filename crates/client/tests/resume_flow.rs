//! Resume flow: a stored snapshot with an in-flight research run is
//! offered for resume, and resuming re-enters polling without a new
//! `start` (no second debit, no replaced run).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use epistle_client::api::ApiError;
use epistle_client::poller::{PollerConfig, StatusPoller, StatusSource};
use epistle_client::sync::{SaveTarget, SyncConfig, SyncEngine};
use epistle_core::research::{ResearchState, ResearchStatus};
use epistle_core::snapshot::{JobSnapshot, SnapshotPayload};

/// Server stand-in shared by the sync engine and the poller. Each
/// status fetch advances the stored run one step toward completion.
struct FakeServer {
    stored: Mutex<Option<JobSnapshot>>,
    saves: AtomicUsize,
}

impl FakeServer {
    fn with_active_research() -> Arc<Self> {
        let mut snapshot = JobSnapshot::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        snapshot.phase = epistle_core::phase::Phase::Research;
        snapshot.form.issue = "flooded cellar".into();
        let mut run = ResearchState::queued(0.7, chrono::Utc::now());
        run.accept("run-77".into());
        run.status = ResearchStatus::InProgress;
        snapshot.research = Some(run);
        Arc::new(Self {
            stored: Mutex::new(Some(snapshot)),
            saves: AtomicUsize::new(0),
        })
    }
}

/// Local handle so the foreign traits can be implemented for a
/// shared `FakeServer` without tripping the orphan rules.
#[derive(Clone)]
struct ServerHandle(Arc<FakeServer>);

#[async_trait]
impl SaveTarget for ServerHandle {
    async fn load(&self) -> Result<Option<JobSnapshot>, ApiError> {
        Ok(self.0.stored.lock().unwrap().clone())
    }

    async fn save(&self, payload: &SnapshotPayload) -> Result<JobSnapshot, ApiError> {
        self.0.saves.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.0.stored.lock().unwrap();
        let snapshot = stored
            .get_or_insert_with(|| JobSnapshot::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4()));
        snapshot.apply_payload(payload);
        Ok(snapshot.clone())
    }

    async fn discard(&self) -> Result<(), ApiError> {
        *self.0.stored.lock().unwrap() = None;
        Ok(())
    }
}

#[async_trait]
impl StatusSource for ServerHandle {
    async fn fetch(&self) -> Result<JobSnapshot, ApiError> {
        let mut stored = self.0.stored.lock().unwrap();
        let snapshot = stored.as_mut().ok_or(ApiError::Api {
            status: 404,
            code: None,
            message: "no job".into(),
        })?;
        if let Some(run) = snapshot.research.as_mut() {
            if run.status == ResearchStatus::InProgress {
                run.status = ResearchStatus::Completed;
                run.result = Some("findings".into());
                run.cursor += 1;
            }
        }
        Ok(snapshot.clone())
    }
}

#[tokio::test(start_paused = true)]
async fn resuming_an_in_flight_run_reenters_polling() {
    let server = FakeServer::with_active_research();
    let engine = SyncEngine::new(ServerHandle(Arc::clone(&server)), SyncConfig::default());

    // The stored snapshot is offered for resume and carries the
    // blocking run.
    let snapshot = engine.load().await.unwrap().expect("resumable snapshot");
    let run = snapshot.active_research().expect("active run");
    assert_eq!(run.status, ResearchStatus::InProgress);
    assert_eq!(run.credits_charged, Some(0.7));

    // Resuming polls the existing run to its terminal status; no new
    // `start`, no save, no replaced state.
    let poller = StatusPoller::new(ServerHandle(Arc::clone(&server)), PollerConfig::default());
    let (rx, handle) = poller.spawn(CancellationToken::new());
    handle.await.unwrap();

    let final_snapshot = rx.borrow().clone().expect("published snapshot");
    let run = final_snapshot.research.expect("run retained");
    assert_eq!(run.status, ResearchStatus::Completed);
    assert_eq!(run.result.as_deref(), Some("findings"));
    assert_eq!(run.runner_job_id.as_deref(), Some("run-77"));
    assert_eq!(server.saves.load(Ordering::SeqCst), 0);

    // Re-queueing the resumed content verbatim is deduplicated.
    engine.note_edit(snapshot.payload());
    assert_eq!(engine.flush_now().await.unwrap(), None);
    assert_eq!(server.saves.load(Ordering::SeqCst), 0);
}
