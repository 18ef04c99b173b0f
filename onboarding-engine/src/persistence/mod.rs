// Draft persistence
// Server drafts over HTTP, a local mirror for offline resilience, and the
// debounced auto-save scheduler that ties them to the wizard store.

pub mod autosave;
pub mod draft;
pub mod http;
pub mod local;

use log::{info, warn};

use crate::engine::store::WizardStore;
use crate::error::PersistenceError;
use crate::persistence::draft::DraftService;
use crate::persistence::local::LocalDraftCache;

/// Where a restored session came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    /// The local mirror. Preferred: it is at least as fresh as the server copy.
    LocalCache,
    NetworkDraft,
    /// Nothing to restore, the wizard starts empty.
    Fresh,
}

/// Session-start hydration. The local mirror wins when present; the server draft is the
/// fallback for a user returning on another machine. A draft the server no longer knows
/// about degrades to a fresh session rather than an error.
pub async fn restore_session(
    store: &mut WizardStore,
    cache: &dyn LocalDraftCache,
    service: &dyn DraftService,
    known_draft_id: Option<&str>,
) -> Result<RestoreSource, PersistenceError> {
    match cache.read() {
        Ok(Some(session)) => {
            info!("[PHASE: restore] [STEP: local_mirror] Restoring session from local mirror");
            let state = session
                .snapshot
                .into_state(session.draft_id, session.last_saved_at);
            store.hydrate(state);
            return Ok(RestoreSource::LocalCache);
        }
        Ok(None) => {}
        Err(e) => {
            warn!("[PHASE: restore] [STEP: local_mirror] Mirror unreadable, trying server: {e}");
        }
    }

    if let Some(draft_id) = known_draft_id {
        match service.load_draft(draft_id).await {
            Ok(snapshot) => {
                info!(
                    "[PHASE: restore] [STEP: server_draft] Restoring session from draft {}",
                    draft_id
                );
                let state = snapshot.into_state(Some(draft_id.to_string()), None);
                store.hydrate(state);
                return Ok(RestoreSource::NetworkDraft);
            }
            Err(PersistenceError::NotFound(_)) => {
                info!(
                    "[PHASE: restore] [STEP: server_draft] Draft {} is gone, starting fresh",
                    draft_id
                );
            }
            Err(e) => return Err(e),
        }
    }

    Ok(RestoreSource::Fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::steps::WizardStep;
    use crate::engine::store::{StoreOptions, WizardStore};
    use crate::models::catalog::FieldCatalog;
    use crate::persistence::draft::testing::InMemoryDraftService;
    use crate::persistence::draft::DraftSnapshot;
    use crate::persistence::local::{CachedSession, FileDraftCache, NullDraftCache};
    use chrono::Utc;

    const CATALOG: &str = r#"{
        "customer": {
            "base": [
                { "key": "companyName", "label": "Firmenname", "fieldType": "text", "required": true }
            ]
        },
        "location": { "base": [] }
    }"#;

    fn test_store() -> WizardStore {
        let catalog = FieldCatalog::from_json_str(CATALOG).unwrap();
        let steps = vec![WizardStep {
            id: "company".into(),
            title: "Unternehmen".into(),
            field_keys: vec!["companyName".into()],
            condition: None,
            collects_locations: false,
        }];
        WizardStore::new(catalog, steps, StoreOptions::default())
    }

    #[tokio::test]
    async fn local_mirror_wins_over_server_draft() {
        let mut store = test_store();
        let service = InMemoryDraftService::default();
        let dir = tempfile::tempdir().unwrap();
        let cache = FileDraftCache::new(dir.path().join("cache.json"));

        let mut mirrored = test_store();
        mirrored.set_field("companyName", "Local Copy".into());
        cache
            .write(&CachedSession {
                draft_id: Some("draft-1".into()),
                last_saved_at: Some(Utc::now()),
                snapshot: DraftSnapshot::from_state(mirrored.state()),
            })
            .unwrap();

        let draft_id = service.create_draft().await.unwrap();
        let mut server_copy = test_store();
        server_copy.set_field("companyName", "Server Copy".into());
        service
            .update_draft(&draft_id, &DraftSnapshot::from_state(server_copy.state()))
            .await
            .unwrap();

        let source = restore_session(&mut store, &cache, &service, Some(&draft_id))
            .await
            .unwrap();

        assert_eq!(source, RestoreSource::LocalCache);
        assert_eq!(
            store.state().entity_data.get("companyName").and_then(|v| v.as_str()),
            Some("Local Copy")
        );
        assert_eq!(store.state().draft_id.as_deref(), Some("draft-1"));
    }

    #[tokio::test]
    async fn server_draft_is_the_fallback() {
        let mut store = test_store();
        let service = InMemoryDraftService::default();

        let draft_id = service.create_draft().await.unwrap();
        let mut server_copy = test_store();
        server_copy.set_field("companyName", "Server Copy".into());
        service
            .update_draft(&draft_id, &DraftSnapshot::from_state(server_copy.state()))
            .await
            .unwrap();

        let source = restore_session(&mut store, &NullDraftCache, &service, Some(&draft_id))
            .await
            .unwrap();

        assert_eq!(source, RestoreSource::NetworkDraft);
        assert_eq!(
            store.state().entity_data.get("companyName").and_then(|v| v.as_str()),
            Some("Server Copy")
        );
    }

    #[tokio::test]
    async fn missing_draft_starts_fresh() {
        let mut store = test_store();
        let service = InMemoryDraftService::default();

        let source = restore_session(&mut store, &NullDraftCache, &service, Some("gone"))
            .await
            .unwrap();

        assert_eq!(source, RestoreSource::Fresh);
        assert!(store.state().entity_data.is_empty());
    }

    #[tokio::test]
    async fn nothing_to_restore_starts_fresh() {
        let mut store = test_store();
        let service = InMemoryDraftService::default();

        let source = restore_session(&mut store, &NullDraftCache, &service, None)
            .await
            .unwrap();

        assert_eq!(source, RestoreSource::Fresh);
    }
}
