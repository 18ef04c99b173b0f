// Auto-save scheduler
//
// Explicit scheduled task instead of a reactive effect: every dirty notification re-arms a
// debounce deadline, and only timer expiry (or manual intent) issues a save. The worker
// processes commands sequentially, which makes "at most one in-flight save" structural: a
// manual save can never race the timer.

use chrono::Utc;
use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::engine::store::WizardStore;
use crate::error::EngineError;
use crate::persistence::draft::{DraftService, DraftSnapshot};
use crate::persistence::local::{CachedSession, LocalDraftCache};

/// Host-side capability check result: constructing one asserts the current user is allowed to
/// finalize the onboarding. RBAC itself lives outside the engine.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeGrant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    /// Dirty, debounce timer armed.
    Pending,
    Saving,
    Saved,
    /// Last attempt failed; `last_error` holds the reason, `retry()` replays it.
    Error,
}

#[derive(Debug, Clone)]
pub struct AutoSaveOptions {
    /// Silence window after the last mutation before a save fires.
    pub debounce: Duration,
}

impl Default for AutoSaveOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2000),
        }
    }
}

enum Command {
    Dirty,
    SaveNow,
    Retry,
    Finalize {
        reply: oneshot::Sender<Result<String, EngineError>>,
    },
    Shutdown {
        reply: Option<oneshot::Sender<()>>,
    },
}

#[derive(Default)]
struct Shared {
    status: std::sync::Mutex<Option<SaveStatus>>,
    last_error: std::sync::Mutex<Option<String>>,
    save_count: AtomicU64,
}

impl Shared {
    fn set_status(&self, status: SaveStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = Some(status);
    }

    fn status(&self) -> SaveStatus {
        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unwrap_or(SaveStatus::Idle)
    }

    fn set_last_error(&self, error: Option<String>) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

pub struct AutoSaveScheduler {
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

impl AutoSaveScheduler {
    pub fn new(
        store: Arc<Mutex<WizardStore>>,
        service: Arc<dyn DraftService>,
        cache: Arc<dyn LocalDraftCache>,
        options: AutoSaveOptions,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let worker = Worker {
            rx,
            store,
            service,
            cache,
            shared: Arc::clone(&shared),
            debounce: options.debounce,
            deadline: None,
            last_payload: None,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            tx,
            shared,
            worker: handle,
        }
    }

    /// Notify the scheduler of a mutation: mirrors the session locally right away and
    /// (re)arms the debounce timer. Debounce, not throttle: the window restarts.
    pub fn mark_dirty(&self) {
        self.send(Command::Dirty);
    }

    /// Manual save: cancels any pending debounce timer and saves immediately.
    pub fn save_now(&self) {
        self.send(Command::SaveNow);
    }

    /// Replay the last failed attempt with the same payload, without re-debouncing.
    pub fn retry(&self) {
        self.send(Command::Retry);
    }

    /// Full-wizard validation, then draft finalization. On success the session is reset and
    /// the local mirror cleared; on failure all state is preserved for correction and retry.
    pub async fn finalize(&self, _grant: FinalizeGrant) -> Result<String, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Finalize { reply });
        rx.await
            .map_err(|_| EngineError::FinalizeRejected("scheduler stopped".to_string()))?
    }

    /// Best-effort flush of a dirty session, then stop the worker.
    pub async fn shutdown(self) {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply: Some(reply) });
        let _ = rx.await;
        let _ = self.worker.await;
    }

    pub fn status(&self) -> SaveStatus {
        self.shared.status()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error()
    }

    /// Successful saves so far (for low-frequency user notifications only).
    pub fn save_count(&self) -> u64 {
        self.shared.save_count.load(Ordering::SeqCst)
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("[PHASE: autosave] [STEP: schedule] Scheduler worker is gone; command dropped");
        }
    }
}

enum Wake {
    Cmd(Command),
    Timer,
    Closed,
}

struct Worker {
    rx: mpsc::UnboundedReceiver<Command>,
    store: Arc<Mutex<WizardStore>>,
    service: Arc<dyn DraftService>,
    cache: Arc<dyn LocalDraftCache>,
    shared: Arc<Shared>,
    debounce: Duration,
    deadline: Option<Instant>,
    last_payload: Option<DraftSnapshot>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let wake = match self.deadline {
                Some(at) => tokio::select! {
                    cmd = self.rx.recv() => cmd.map(Wake::Cmd).unwrap_or(Wake::Closed),
                    _ = sleep_until(at) => Wake::Timer,
                },
                None => self.rx.recv().await.map(Wake::Cmd).unwrap_or(Wake::Closed),
            };

            match wake {
                Wake::Cmd(Command::Dirty) => {
                    self.mirror_locally().await;
                    self.deadline = Some(Instant::now() + self.debounce);
                    self.shared.set_status(SaveStatus::Pending);
                }
                Wake::Timer => {
                    self.deadline = None;
                    self.perform_save(false).await;
                }
                Wake::Cmd(Command::SaveNow) => {
                    // Manual intent pre-empts automatic timing.
                    self.deadline = None;
                    self.perform_save(false).await;
                }
                Wake::Cmd(Command::Retry) => {
                    self.deadline = None;
                    self.perform_save(true).await;
                }
                Wake::Cmd(Command::Finalize { reply }) => {
                    self.deadline = None;
                    let result = self.perform_finalize().await;
                    let _ = reply.send(result);
                }
                Wake::Cmd(Command::Shutdown { reply }) => {
                    self.flush_if_dirty().await;
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                    break;
                }
                Wake::Closed => {
                    self.flush_if_dirty().await;
                    break;
                }
            }
        }
    }

    // The local mirror is written on every mutation cycle, not gated by the debounce.
    async fn mirror_locally(&self) {
        let session = {
            let store = self.store.lock().await;
            CachedSession {
                draft_id: store.state().draft_id.clone(),
                last_saved_at: store.state().last_saved_at,
                snapshot: DraftSnapshot::from_state(store.state()),
            }
        };
        if let Err(e) = self.cache.write(&session) {
            // Cache trouble must never block editing.
            warn!("[PHASE: autosave] [STEP: local_mirror] Mirror write failed: {e}");
        }
    }

    async fn flush_if_dirty(&mut self) {
        let dirty = self.store.lock().await.state().is_dirty;
        if dirty {
            info!("[PHASE: autosave] [STEP: shutdown] Flushing dirty session");
            self.perform_save(false).await;
        }
    }

    async fn perform_save(&mut self, reuse_last_payload: bool) {
        let (snapshot, draft_id) = {
            let mut store = self.store.lock().await;
            if !store.state().is_dirty {
                return;
            }
            store.set_saving(true);
            let snapshot = if reuse_last_payload {
                self.last_payload
                    .clone()
                    .unwrap_or_else(|| DraftSnapshot::from_state(store.state()))
            } else {
                DraftSnapshot::from_state(store.state())
            };
            (snapshot, store.state().draft_id.clone())
        };
        self.shared.set_status(SaveStatus::Saving);

        // First save allocates the draft identity; it stays stable for the session.
        let draft_id = match draft_id {
            Some(id) => id,
            None => match self.service.create_draft().await {
                Ok(id) => {
                    self.store.lock().await.set_draft_id(id.clone());
                    id
                }
                Err(e) => {
                    self.record_failure(e.to_string()).await;
                    return;
                }
            },
        };

        self.last_payload = Some(snapshot.clone());
        match self.service.update_draft(&draft_id, &snapshot).await {
            Ok(()) => {
                let now = Utc::now();
                self.store.lock().await.mark_saved(now);
                let count = self.shared.save_count.fetch_add(1, Ordering::SeqCst) + 1;
                self.shared.set_last_error(None);
                self.shared.set_status(SaveStatus::Saved);
                self.mirror_locally().await;
                info!(
                    "[PHASE: autosave] [STEP: persist] Draft {} saved (save #{})",
                    draft_id, count
                );
            }
            Err(e) => self.record_failure(e.to_string()).await,
        }
    }

    async fn perform_finalize(&mut self) -> Result<String, EngineError> {
        let (snapshot, draft_id) = {
            let mut store = self.store.lock().await;
            store.finish_check()?;
            (
                DraftSnapshot::from_state(store.state()),
                store.state().draft_id.clone(),
            )
        };

        // A session that was never auto-saved still needs a draft identity to finalize.
        let draft_id = match draft_id {
            Some(id) => id,
            None => {
                let id = self.service.create_draft().await?;
                self.store.lock().await.set_draft_id(id.clone());
                id
            }
        };

        match self.service.finalize(&draft_id, &snapshot).await {
            Ok(entity_id) => {
                self.store.lock().await.reset();
                if let Err(e) = self.cache.clear() {
                    warn!("[PHASE: finalize] [STEP: local_mirror] Cache clear failed: {e}");
                }
                self.last_payload = None;
                self.shared.set_last_error(None);
                self.shared.set_status(SaveStatus::Idle);
                info!(
                    "[PHASE: finalize] [STEP: commit] Draft {} finalized as {}",
                    draft_id, entity_id
                );
                Ok(entity_id)
            }
            Err(e) => {
                // Terminal for the attempt only: state stays so the user can correct and retry.
                self.shared.set_last_error(Some(e.to_string()));
                Err(EngineError::FinalizeRejected(e.to_string()))
            }
        }
    }

    async fn record_failure(&self, message: String) {
        self.store.lock().await.set_saving(false);
        warn!("[PHASE: autosave] [STEP: persist] Save failed: {message}");
        self.shared.set_last_error(Some(message));
        self.shared.set_status(SaveStatus::Error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::steps::WizardStep;
    use crate::engine::store::{StoreOptions, WizardStore};
    use crate::models::catalog::FieldCatalog;
    use crate::persistence::draft::testing::InMemoryDraftService;
    use crate::persistence::local::{FileDraftCache, NullDraftCache};
    use tokio::time::sleep;

    const CATALOG: &str = r#"{
        "customer": {
            "base": [
                { "key": "companyName", "label": "Firmenname", "fieldType": "text", "required": true },
                { "key": "email", "label": "E-Mail", "fieldType": "email", "required": true }
            ]
        },
        "location": { "base": [] }
    }"#;

    fn steps() -> Vec<WizardStep> {
        vec![
            WizardStep {
                id: "company".into(),
                title: "Unternehmen".into(),
                field_keys: vec!["companyName".into()],
                condition: None,
                collects_locations: false,
            },
            WizardStep {
                id: "contact".into(),
                title: "Kontakt".into(),
                field_keys: vec!["email".into()],
                condition: None,
                collects_locations: false,
            },
        ]
    }

    fn test_store() -> Arc<Mutex<WizardStore>> {
        let catalog = FieldCatalog::from_json_str(CATALOG).unwrap();
        Arc::new(Mutex::new(WizardStore::new(
            catalog,
            steps(),
            StoreOptions::default(),
        )))
    }

    fn scheduler_with(
        store: &Arc<Mutex<WizardStore>>,
        service: &Arc<InMemoryDraftService>,
        debounce_ms: u64,
    ) -> AutoSaveScheduler {
        AutoSaveScheduler::new(
            Arc::clone(store),
            Arc::clone(service) as Arc<dyn DraftService>,
            Arc::new(NullDraftCache),
            AutoSaveOptions {
                debounce: Duration::from_millis(debounce_ms),
            },
        )
    }

    async fn mutate(store: &Arc<Mutex<WizardStore>>, scheduler: &AutoSaveScheduler, key: &str, value: &str) {
        store.lock().await.set_field(key, value.into());
        scheduler.mark_dirty();
    }

    #[tokio::test]
    async fn debounce_coalesces_mutations_into_one_save() {
        let store = test_store();
        let service = Arc::new(InMemoryDraftService::default());
        let scheduler = scheduler_with(&store, &service, 80);

        mutate(&store, &scheduler, "companyName", "A").await;
        mutate(&store, &scheduler, "companyName", "Ac").await;
        mutate(&store, &scheduler, "companyName", "Acme").await;

        sleep(Duration::from_millis(300)).await;

        assert_eq!(service.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.update_calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.status(), SaveStatus::Saved);
        assert_eq!(scheduler.save_count(), 1);

        let store = store.lock().await;
        assert!(!store.state().is_dirty);
        assert!(store.state().last_saved_at.is_some());
        assert!(store.state().draft_id.is_some());
    }

    #[tokio::test]
    async fn draft_id_is_created_once_and_reused() {
        let store = test_store();
        let service = Arc::new(InMemoryDraftService::default());
        let scheduler = scheduler_with(&store, &service, 40);

        mutate(&store, &scheduler, "companyName", "Acme").await;
        sleep(Duration::from_millis(200)).await;
        let first_id = store.lock().await.state().draft_id.clone();

        mutate(&store, &scheduler, "email", "info@acme.de").await;
        sleep(Duration::from_millis(200)).await;

        assert_eq!(service.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.update_calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.lock().await.state().draft_id, first_id);
    }

    #[tokio::test]
    async fn manual_save_preempts_the_debounce_timer() {
        let store = test_store();
        let service = Arc::new(InMemoryDraftService::default());
        let scheduler = scheduler_with(&store, &service, 200);

        mutate(&store, &scheduler, "companyName", "Acme").await;
        scheduler.save_now();
        sleep(Duration::from_millis(80)).await;
        assert_eq!(service.update_calls.load(Ordering::SeqCst), 1);

        // The cancelled timer must not fire a second save.
        sleep(Duration::from_millis(400)).await;
        assert_eq!(service.update_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn save_failure_keeps_dirty_and_retry_replays_once() {
        let store = test_store();
        let service = Arc::new(InMemoryDraftService::default());
        let scheduler = scheduler_with(&store, &service, 40);

        service.set_failing(true);
        mutate(&store, &scheduler, "companyName", "Acme").await;
        sleep(Duration::from_millis(200)).await;

        assert_eq!(service.update_calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.status(), SaveStatus::Error);
        assert!(scheduler.last_error().is_some());
        assert!(store.lock().await.state().is_dirty);

        service.set_failing(false);
        scheduler.retry();
        sleep(Duration::from_millis(100)).await;

        assert_eq!(
            service.update_calls.load(Ordering::SeqCst),
            2,
            "retry issues exactly one more persistence call"
        );
        assert_eq!(scheduler.status(), SaveStatus::Saved);
        assert_eq!(scheduler.last_error(), None);
        assert!(!store.lock().await.state().is_dirty);
    }

    #[tokio::test]
    async fn local_mirror_is_written_before_the_network_save() {
        let store = test_store();
        let service = Arc::new(InMemoryDraftService::default());
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FileDraftCache::new(dir.path().join("cache.json")));

        let scheduler = AutoSaveScheduler::new(
            Arc::clone(&store),
            Arc::clone(&service) as Arc<dyn DraftService>,
            Arc::clone(&cache) as Arc<dyn LocalDraftCache>,
            AutoSaveOptions {
                debounce: Duration::from_millis(500),
            },
        );

        mutate(&store, &scheduler, "companyName", "Acme").await;
        sleep(Duration::from_millis(80)).await;

        // Mirror is there even though the debounce window has not elapsed.
        assert_eq!(service.update_calls.load(Ordering::SeqCst), 0);
        let cached = cache.read().unwrap().expect("mirror written");
        assert!(cached.snapshot.field_values.contains_key("companyName"));
    }

    #[tokio::test]
    async fn shutdown_flushes_a_dirty_session() {
        let store = test_store();
        let service = Arc::new(InMemoryDraftService::default());
        let scheduler = scheduler_with(&store, &service, 10_000);

        mutate(&store, &scheduler, "companyName", "Acme").await;
        scheduler.shutdown().await;

        assert_eq!(service.update_calls.load(Ordering::SeqCst), 1);
        assert!(!store.lock().await.state().is_dirty);
    }

    #[tokio::test]
    async fn finalize_resets_session_and_clears_mirror() {
        let store = test_store();
        let service = Arc::new(InMemoryDraftService::default());
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FileDraftCache::new(dir.path().join("cache.json")));

        let scheduler = AutoSaveScheduler::new(
            Arc::clone(&store),
            Arc::clone(&service) as Arc<dyn DraftService>,
            Arc::clone(&cache) as Arc<dyn LocalDraftCache>,
            AutoSaveOptions::default(),
        );

        {
            let mut store = store.lock().await;
            store.set_field("companyName", "Acme".into());
            store.set_field("email", "info@acme.de".into());
            store.next();
        }
        scheduler.mark_dirty();
        sleep(Duration::from_millis(50)).await;

        let entity_id = scheduler.finalize(FinalizeGrant).await.unwrap();
        assert!(entity_id.starts_with("customer-for-"));
        assert_eq!(service.finalize_calls.load(Ordering::SeqCst), 1);

        let store = store.lock().await;
        assert!(store.state().entity_data.is_empty());
        assert!(store.state().draft_id.is_none());
        assert_eq!(cache.read().unwrap(), None);
    }

    #[tokio::test]
    async fn finalize_is_blocked_off_the_last_step() {
        let store = test_store();
        let service = Arc::new(InMemoryDraftService::default());
        let scheduler = scheduler_with(&store, &service, 40);

        store.lock().await.set_field("companyName", "Acme".into());

        let result = scheduler.finalize(FinalizeGrant).await;
        assert!(matches!(result, Err(EngineError::NotOnLastStep)));
        assert_eq!(service.finalize_calls.load(Ordering::SeqCst), 0);
        // Session preserved for correction.
        assert!(!store.lock().await.state().entity_data.is_empty());
    }

    #[tokio::test]
    async fn finalize_backend_rejection_preserves_state() {
        let store = test_store();
        let service = Arc::new(InMemoryDraftService::default());
        let scheduler = scheduler_with(&store, &service, 40);

        {
            let mut store = store.lock().await;
            store.set_field("companyName", "Acme".into());
            store.set_field("email", "info@acme.de".into());
            store.next();
        }
        service.set_failing(true);

        let result = scheduler.finalize(FinalizeGrant).await;
        assert!(matches!(result, Err(EngineError::FinalizeRejected(_))));
        assert!(!store.lock().await.state().entity_data.is_empty());
    }
}
