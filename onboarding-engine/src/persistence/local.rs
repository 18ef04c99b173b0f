// Local fallback persistence
//
// A partial mirror of the session written on every mutation cycle, NOT gated by the network
// debounce: a reload before the next network save still recovers most in-progress work. This is
// a cache, not the source of truth: at session start it wins for immediate population, and a
// background reconciliation with the network draft may overwrite it.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PersistenceError;
use crate::persistence::draft::DraftSnapshot;

/// What the mirror holds: the draft identity plus the same snapshot shape the network sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSession {
    pub draft_id: Option<String>,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub snapshot: DraftSnapshot,
}

/// Storage seam for the mirror. Synchronous by design: writes happen inline with the mutation
/// cycle and must not depend on the network.
pub trait LocalDraftCache: Send + Sync {
    fn write(&self, session: &CachedSession) -> Result<(), PersistenceError>;
    fn read(&self) -> Result<Option<CachedSession>, PersistenceError>;
    fn clear(&self) -> Result<(), PersistenceError>;
}

/// File-backed mirror (the browser build uses localStorage; everywhere else a JSON file).
pub struct FileDraftCache {
    path: PathBuf,
}

impl FileDraftCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default cache location under the platform's local data directory.
    pub fn in_default_location() -> Result<Self, PersistenceError> {
        let base = dirs::data_local_dir()
            .ok_or_else(|| PersistenceError::Cache("no local data directory".to_string()))?;
        Ok(Self::new(base.join("crm-onboarding").join("draft-cache.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocalDraftCache for FileDraftCache {
    fn write(&self, session: &CachedSession) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PersistenceError::Cache(format!("create {parent:?}: {e}")))?;
        }
        let json = serde_json::to_vec(session)
            .map_err(|e| PersistenceError::Cache(format!("serialize: {e}")))?;

        // Write-then-rename so a crash mid-write never leaves a torn mirror.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| PersistenceError::Cache(format!("write: {e}")))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| PersistenceError::Cache(format!("rename: {e}")))?;
        Ok(())
    }

    fn read(&self) -> Result<Option<CachedSession>, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistenceError::Cache(format!("read: {e}"))),
        };
        match serde_json::from_slice(&bytes) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                // A corrupt mirror must not block session start; treat it as absent.
                warn!(
                    "[PHASE: hydrate] [STEP: local_cache] Discarding unreadable cache at {:?}: {}",
                    self.path, e
                );
                Ok(None)
            }
        }
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("[PHASE: hydrate] [STEP: local_cache] Cache cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::Cache(format!("remove: {e}"))),
        }
    }
}

/// No-op cache for hosts that opt out of local fallback.
pub struct NullDraftCache;

impl LocalDraftCache for NullDraftCache {
    fn write(&self, _session: &CachedSession) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn read(&self) -> Result<Option<CachedSession>, PersistenceError> {
        Ok(None)
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}
