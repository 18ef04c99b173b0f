// Draft persistence contract
//
// The engine talks to the backing store through this trait only; the REST client in
// `persistence::http` is one implementation, tests use an in-memory double.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::engine::store::{Location, WizardState};
use crate::error::PersistenceError;
use crate::models::value::{EntityData, FieldValue};

/// The snapshot shipped to (and rehydrated from) the draft store: flattened entity data,
/// the location sub-entities with their bags, plus a metadata marker for downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSnapshot {
    #[serde(default)]
    pub field_values: HashMap<String, FieldValue>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub location_field_values: HashMap<String, EntityData>,
    pub location_count: usize,
    pub last_modified: DateTime<Utc>,
}

impl DraftSnapshot {
    pub fn from_state(state: &WizardState) -> Self {
        Self {
            field_values: state.entity_data.clone(),
            locations: state.locations.clone(),
            location_field_values: state.location_data.clone(),
            location_count: state.locations.len(),
            last_modified: Utc::now(),
        }
    }

    /// Rebuild a session state from a persisted snapshot. Step index and flags start fresh;
    /// the store clamps the index on hydrate.
    pub fn into_state(self, draft_id: Option<String>, last_saved_at: Option<DateTime<Utc>>) -> WizardState {
        WizardState {
            current_step_index: 0,
            is_dirty: false,
            is_saving: false,
            last_saved_at,
            draft_id,
            entity_data: self.field_values,
            locations: self.locations,
            location_data: self.location_field_values,
            validation_errors: Default::default(),
        }
    }
}

/// Server-side draft API. `create_draft` is called at most once per session (before the first
/// `draft_id` is known); `update_draft` replaces the stored snapshot wholesale.
#[async_trait]
pub trait DraftService: Send + Sync {
    async fn create_draft(&self) -> Result<String, PersistenceError>;
    async fn update_draft(&self, draft_id: &str, snapshot: &DraftSnapshot)
        -> Result<(), PersistenceError>;
    async fn load_draft(&self, draft_id: &str) -> Result<DraftSnapshot, PersistenceError>;
    /// Converts the draft into a permanent record; only called after full-wizard validation.
    async fn finalize(&self, draft_id: &str, snapshot: &DraftSnapshot)
        -> Result<String, PersistenceError>;
}


#[cfg(test)]
mod tests {
    use super::testing::InMemoryDraftService;
    use super::*;

    fn sample_state() -> WizardState {
        let mut state = WizardState::default();
        state.entity_data.insert("companyName".into(), "Acme GmbH".into());
        state.entity_data.insert("employeeCount".into(), FieldValue::Number(12.0));
        state.entity_data.insert("multiSite".into(), FieldValue::Bool(true));
        state.locations.push(Location {
            id: "loc-1".into(),
            position: 0,
        });
        let mut bag = EntityData::new();
        bag.insert("street".into(), "Hauptstr. 1".into());
        state.location_data.insert("loc-1".into(), bag);
        state
    }

    #[tokio::test]
    async fn update_then_load_round_trips_field_for_field() {
        let service = InMemoryDraftService::default();
        let id = service.create_draft().await.unwrap();

        let snapshot = DraftSnapshot::from_state(&sample_state());
        service.update_draft(&id, &snapshot).await.unwrap();

        let loaded = service.load_draft(&id).await.unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn load_of_unknown_draft_is_not_found() {
        let service = InMemoryDraftService::default();
        assert!(matches!(
            service.load_draft("missing").await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[test]
    fn snapshot_wire_format_is_camel_case() {
        let snapshot = DraftSnapshot::from_state(&sample_state());
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"fieldValues\""));
        assert!(json.contains("\"locationFieldValues\""));
        assert!(json.contains("\"locationCount\":1"));
        assert!(json.contains("\"lastModified\""));
    }

    #[test]
    fn snapshot_into_state_restores_data_and_identity() {
        let original = sample_state();
        let snapshot = DraftSnapshot::from_state(&original);
        let restored = snapshot.into_state(Some("draft-9".into()), None);

        assert_eq!(restored.entity_data, original.entity_data);
        assert_eq!(restored.locations, original.locations);
        assert_eq!(restored.location_data, original.location_data);
        assert_eq!(restored.draft_id.as_deref(), Some("draft-9"));
        assert!(!restored.is_dirty);
        assert_eq!(restored.current_step_index, 0);
    }
}
