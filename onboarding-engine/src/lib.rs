// CRM Customer Onboarding Engine
// Field-catalog driven wizard: visibility, validation, step flow, and draft auto-save.

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod persistence;
pub mod utils;

pub use crate::config::EngineConfig;
pub use engine::condition::{evaluate, is_visible, visible_fields};
pub use engine::schema::{validate_field, validate_fields, FieldCheck, ValidationErrorMap};
pub use engine::steps::{visible_steps, StepProgress, WizardStep};
pub use engine::store::{Location, StepAdvance, StoreOptions, WizardState, WizardStore};
pub use error::{CatalogError, CatalogIntegrityWarning, EngineError, PersistenceError};
pub use models::catalog::{
    Condition, ConditionOperator, EntityCatalog, FieldCatalog, FieldDescriptor, FieldType,
    SelectOption, ValidationRule,
};
pub use models::value::{EntityData, FieldValue};
pub use persistence::autosave::{
    AutoSaveOptions, AutoSaveScheduler, FinalizeGrant, SaveStatus,
};
pub use persistence::draft::{DraftService, DraftSnapshot};
pub use persistence::http::{HttpDraftService, HttpDraftServiceOptions};
pub use persistence::local::{CachedSession, FileDraftCache, LocalDraftCache, NullDraftCache};
pub use persistence::{restore_session, RestoreSource};
