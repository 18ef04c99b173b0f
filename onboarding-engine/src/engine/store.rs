// Wizard state store
//
// One explicit, owned state struct per onboarding session. All mutations are synchronous and
// atomic from the caller's perspective; the only async work (draft persistence) lives in the
// auto-save scheduler, which borrows this store behind a mutex.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::engine::condition;
use crate::engine::schema::{self, ValidationErrorMap};
use crate::engine::steps::{visible_steps, StepProgress, WizardStep};
use crate::error::EngineError;
use crate::models::catalog::{FieldCatalog, FieldDescriptor};
use crate::models::value::{EntityData, FieldValue};

/// A location sub-entity. Its field values live in a separate bag keyed by this id and are
/// cascade-deleted with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub position: u32,
}

/// The complete mutable session state. Created empty (or hydrated from a draft), reset on
/// finalize or abandonment. `draft_id` is assigned by the persistence service on first save
/// and stable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    pub current_step_index: usize,
    pub is_dirty: bool,
    pub is_saving: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub draft_id: Option<String>,
    pub entity_data: EntityData,
    pub locations: Vec<Location>,
    pub location_data: HashMap<String, EntityData>,
    pub validation_errors: ValidationErrorMap,
}

/// Entity/field wiring the store needs from the host. Defaults match the catalog conventions.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub customer_entity: String,
    pub location_entity: String,
    /// The customer field whose value selects the industry-specific catalog additions.
    pub industry_field_key: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            customer_entity: "customer".to_string(),
            location_entity: "location".to_string(),
            industry_field_key: "industry".to_string(),
        }
    }
}

/// Outcome of a `next` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAdvance {
    /// Validation passed and the index moved forward. The caller should request an explicit
    /// save now (manual intent pre-empts the debounce timer).
    Advanced,
    /// Validation failed; errors are in the state's error map.
    Blocked,
    /// Already on the last visible step; use the finalize flow instead.
    AtLastStep,
}

pub struct WizardStore {
    catalog: FieldCatalog,
    steps: Vec<WizardStep>,
    options: StoreOptions,
    state: WizardState,
}

impl WizardStore {
    pub fn new(catalog: FieldCatalog, steps: Vec<WizardStep>, options: StoreOptions) -> Self {
        // Surface catalog defects once, up front. They degrade at evaluation time regardless.
        let _ = catalog.integrity_warnings();
        Self {
            catalog,
            steps,
            options,
            state: WizardState::default(),
        }
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    // =========================
    // Catalog views
    // =========================

    fn active_industry(&self) -> Option<&str> {
        self.state
            .entity_data
            .get(&self.options.industry_field_key)
            .and_then(FieldValue::as_str)
    }

    /// Merged customer field list for the currently selected industry, in catalog order.
    pub fn customer_fields(&self) -> Vec<FieldDescriptor> {
        self.catalog
            .fields_for(&self.options.customer_entity, self.active_industry())
    }

    pub fn location_fields(&self) -> Vec<FieldDescriptor> {
        self.catalog
            .fields_for(&self.options.location_entity, self.active_industry())
    }

    /// Customer fields visible for the current data snapshot, catalog order preserved.
    pub fn visible_customer_fields(&self) -> Vec<FieldDescriptor> {
        self.customer_fields()
            .into_iter()
            .filter(|f| condition::is_visible(f, &self.state.entity_data))
            .collect()
    }

    // =========================
    // Mutations
    // =========================

    /// Set one customer field. Clears the field's error optimistically (it comes back only
    /// through the next validation pass), marks the session dirty, re-derives visibility.
    pub fn set_field(&mut self, key: &str, value: FieldValue) {
        self.state.entity_data.insert(key.to_string(), value);
        self.state.validation_errors.remove(key);
        self.state.is_dirty = true;
        self.prune_hidden_errors();
        self.clamp_step_index();
    }

    pub fn remove_field(&mut self, key: &str) {
        self.state.entity_data.remove(key);
        self.state.validation_errors.remove(key);
        self.state.is_dirty = true;
        self.prune_hidden_errors();
        self.clamp_step_index();
    }

    /// Create a new location with a fresh id, ordered after the existing ones.
    pub fn add_location(&mut self) -> String {
        let position = self
            .state
            .locations
            .iter()
            .map(|l| l.position)
            .max()
            .map_or(0, |p| p + 1);
        let id = Uuid::new_v4().to_string();
        self.state.locations.push(Location {
            id: id.clone(),
            position,
        });
        self.state.location_data.insert(id.clone(), EntityData::new());
        self.state.is_dirty = true;
        info!("[PHASE: wizard] [STEP: location_add] Added location {}", id);
        id
    }

    /// Remove a location and cascade-delete its value bag and any of its error entries.
    pub fn remove_location(&mut self, location_id: &str) -> Result<(), EngineError> {
        let before = self.state.locations.len();
        self.state.locations.retain(|l| l.id != location_id);
        if self.state.locations.len() == before {
            return Err(EngineError::UnknownLocation(location_id.to_string()));
        }

        self.state.location_data.remove(location_id);
        let prefix = scoped_prefix(location_id);
        self.state
            .validation_errors
            .retain(|k, _| !k.starts_with(&prefix));
        self.state.is_dirty = true;
        info!(
            "[PHASE: wizard] [STEP: location_remove] Removed location {}",
            location_id
        );
        Ok(())
    }

    pub fn set_location_field(
        &mut self,
        location_id: &str,
        key: &str,
        value: FieldValue,
    ) -> Result<(), EngineError> {
        let bag = self
            .state
            .location_data
            .get_mut(location_id)
            .ok_or_else(|| EngineError::UnknownLocation(location_id.to_string()))?;
        bag.insert(key.to_string(), value);
        self.state
            .validation_errors
            .remove(&scoped_key(location_id, key));
        self.state.is_dirty = true;
        Ok(())
    }

    // =========================
    // Step state machine
    // =========================

    pub fn visible_step_count(&self) -> usize {
        visible_steps(&self.steps, &self.state.entity_data).len()
    }

    pub fn current_step(&self) -> Option<&WizardStep> {
        visible_steps(&self.steps, &self.state.entity_data)
            .get(self.state.current_step_index)
            .copied()
    }

    pub fn step_progress(&self) -> Option<StepProgress> {
        let visible = visible_steps(&self.steps, &self.state.entity_data);
        let step = visible.get(self.state.current_step_index)?;
        Some(StepProgress {
            step_index: self.state.current_step_index,
            step_count: visible.len(),
            step_id: step.id.clone(),
            is_last: self.state.current_step_index + 1 == visible.len(),
        })
    }

    /// Validate the required-and-visible fields of the active step. Errors for the step's
    /// fields are fully recomputed: stale entries are removed, passing fields stay absent.
    pub fn validate_current_step(&mut self) -> bool {
        match self.current_step().cloned() {
            Some(step) => self.validate_step(&step),
            // No visible step (empty wizard): nothing to block on.
            None => true,
        }
    }

    /// Validate every visible step. Used by the finalize gate.
    pub fn validate_all(&mut self) -> bool {
        let steps: Vec<WizardStep> = visible_steps(&self.steps, &self.state.entity_data)
            .into_iter()
            .cloned()
            .collect();
        let mut ok = true;
        for step in &steps {
            ok &= self.validate_step(step);
        }
        ok
    }

    fn validate_step(&mut self, step: &WizardStep) -> bool {
        let fields = self.customer_fields();
        let by_key: HashMap<&str, &FieldDescriptor> =
            fields.iter().map(|f| (f.key.as_str(), f)).collect();

        let errors = {
            let entries = step
                .field_keys
                .iter()
                .filter_map(|key| by_key.get(key.as_str()).copied())
                .filter(|f| condition::is_visible(f, &self.state.entity_data))
                .map(|f| (f, self.state.entity_data.get(&f.key)));
            schema::validate_fields(entries)
        };

        for key in &step.field_keys {
            self.state.validation_errors.remove(key);
        }
        let mut ok = errors.is_empty();
        self.state.validation_errors.extend(errors);

        if step.collects_locations {
            ok &= self.validate_locations();
        }

        if !ok {
            warn!(
                "[PHASE: wizard] [STEP: validate] Step '{}' blocked by {} error(s)",
                step.id,
                self.state.validation_errors.len()
            );
        }
        ok
    }

    fn validate_locations(&mut self) -> bool {
        let loc_fields = self.location_fields();
        let empty = EntityData::new();

        let mut scoped: Vec<(String, String)> = Vec::new();
        for location in &self.state.locations {
            let bag = self.state.location_data.get(&location.id).unwrap_or(&empty);
            let entries = loc_fields
                .iter()
                .filter(|f| condition::is_visible(f, bag))
                .map(|f| (f, bag.get(&f.key)));
            for (key, message) in schema::validate_fields(entries) {
                scoped.push((scoped_key(&location.id, &key), message));
            }
        }

        self.state.validation_errors.retain(|k, _| !is_scoped_key(k));
        let ok = scoped.is_empty();
        self.state.validation_errors.extend(scoped);
        ok
    }

    /// Advance to the next visible step. Gated on the current step validating clean.
    pub fn next(&mut self) -> StepAdvance {
        if !self.validate_current_step() {
            return StepAdvance::Blocked;
        }
        let count = self.visible_step_count();
        if self.state.current_step_index + 1 < count {
            self.state.current_step_index += 1;
            info!(
                "[PHASE: wizard] [STEP: navigate] Advanced to step {}/{}",
                self.state.current_step_index + 1,
                count
            );
            StepAdvance::Advanced
        } else {
            StepAdvance::AtLastStep
        }
    }

    /// Always allowed; no validation gate.
    pub fn back(&mut self) {
        self.state.current_step_index = self.state.current_step_index.saturating_sub(1);
    }

    /// Gate for the finalize flow: must stand on the last visible step and the whole wizard
    /// must validate clean. Leaves state untouched on failure so the user can correct.
    pub fn finish_check(&mut self) -> Result<(), EngineError> {
        let count = self.visible_step_count();
        if count == 0 || self.state.current_step_index + 1 != count {
            return Err(EngineError::NotOnLastStep);
        }
        if !self.validate_all() {
            return Err(EngineError::ValidationFailed {
                field_count: self.state.validation_errors.len(),
            });
        }
        Ok(())
    }

    /// Drop the whole session. Idempotent.
    pub fn reset(&mut self) {
        self.state = WizardState::default();
        info!("[PHASE: wizard] [STEP: reset] Session state cleared");
    }

    // =========================
    // Persistence hooks (called by the auto-save scheduler)
    // =========================

    pub fn set_draft_id(&mut self, draft_id: String) {
        self.state.draft_id = Some(draft_id);
    }

    pub fn set_saving(&mut self, saving: bool) {
        self.state.is_saving = saving;
    }

    pub fn mark_saved(&mut self, at: DateTime<Utc>) {
        self.state.is_dirty = false;
        self.state.is_saving = false;
        self.state.last_saved_at = Some(at);
    }

    /// Replace the session with previously persisted data (local mirror or network draft).
    /// Clamps the restored step index against the restored data's visible steps.
    pub fn hydrate(&mut self, state: WizardState) {
        self.state = state;
        self.state.is_saving = false;
        self.clamp_step_index();
        info!(
            "[PHASE: wizard] [STEP: hydrate] Restored session (draft: {:?}, {} location(s))",
            self.state.draft_id,
            self.state.locations.len()
        );
    }

    // =========================
    // Internal consistency
    // =========================

    // Whenever data changes, errors for fields that are no longer visible must go: invisibility
    // is a validation bypass, and a hidden field's stale error would wedge step progression.
    // Location-scoped entries are tied to the locations step as a whole; they stay while that
    // step is visible (validate_locations recomputes them) and are dropped when it is hidden.
    fn prune_hidden_errors(&mut self) {
        let fields = self.customer_fields();
        let data = &self.state.entity_data;
        let hidden_or_gone = |key: &str| {
            fields
                .iter()
                .find(|f| f.key == key)
                .map_or(true, |f| !condition::is_visible(f, data))
        };
        let locations_step_visible = visible_steps(&self.steps, data)
            .iter()
            .any(|s| s.collects_locations);

        let stale: Vec<String> = self
            .state
            .validation_errors
            .keys()
            .filter(|k| {
                if is_scoped_key(k) {
                    !locations_step_visible
                } else {
                    hidden_or_gone(k)
                }
            })
            .cloned()
            .collect();
        for key in stale {
            self.state.validation_errors.remove(&key);
        }
    }

    // The visible step set can shrink under the cursor; never leave the index dangling.
    fn clamp_step_index(&mut self) {
        let count = self.visible_step_count();
        if count == 0 {
            self.state.current_step_index = 0;
        } else if self.state.current_step_index >= count {
            self.state.current_step_index = count - 1;
        }
    }
}

fn scoped_key(location_id: &str, field_key: &str) -> String {
    format!("{location_id}.{field_key}")
}

fn scoped_prefix(location_id: &str) -> String {
    format!("{location_id}.")
}

// Location error entries are namespaced "locationId.fieldKey"; customer keys never contain '.'.
fn is_scoped_key(key: &str) -> bool {
    key.contains('.')
}
