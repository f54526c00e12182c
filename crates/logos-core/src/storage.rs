use crate::accounts::AccountState;
use crate::audit::AuditLogEntry;
use crate::error::LogosError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything that survives a process restart, persisted as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub accounts: AccountState,
    pub risk_value: f64,
    pub log: Vec<AuditLogEntry>,
}

/// State persistence backend.
///
/// Read failures fall back to documented defaults; write failures are logged
/// by the caller and never abort an in-progress cycle.
#[derive(Debug, Clone)]
pub enum StateStore {
    /// Nothing persists; every bootstrap starts from defaults.
    Memory,
    /// Single JSON document on disk.
    JsonFile { path: PathBuf },
}

impl Default for StateStore {
    fn default() -> Self {
        Self::Memory
    }
}

impl StateStore {
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::JsonFile { path: path.into() }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::JsonFile { .. } => "json_file",
        }
    }

    /// Load persisted state. `None` means "use documented defaults", covering
    /// both a missing document and an unreadable one.
    pub fn load(&self) -> Option<PersistedState> {
        match self {
            Self::Memory => None,
            Self::JsonFile { path } => {
                let raw = match std::fs::read(path) {
                    Ok(raw) => raw,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err,
                            "State read failed; falling back to defaults");
                        return None;
                    }
                };
                match serde_json::from_slice::<PersistedState>(&raw) {
                    Ok(state) => {
                        tracing::info!(path = %path.display(), "Persisted state loaded");
                        Some(state)
                    }
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err,
                            "Persisted state corrupt; falling back to defaults");
                        None
                    }
                }
            }
        }
    }

    pub fn save(&self, state: &PersistedState) -> Result<(), LogosError> {
        match self {
            Self::Memory => Ok(()),
            Self::JsonFile { path } => {
                let bytes = serde_json::to_vec_pretty(state)
                    .map_err(|e| LogosError::Serialization(e.to_string()))?;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| LogosError::Persistence(e.to_string()))?;
                }
                std::fs::write(path, bytes).map_err(|e| LogosError::Persistence(e.to_string()))
            }
        }
    }
}
