//! In-memory backend for tests and embedding.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::DialogBackend;
use crate::types::{PersistedDialog, VariableError, VariableStore};

/// Error type for the in-memory backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InMemoryBackendError {
    /// Dialog not found.
    #[error("Dialog {dialog_id} not found in project {project_id}")]
    DialogNotFound {
        /// Project searched.
        project_id: String,
        /// Missing dialog.
        dialog_id: String,
    },
    /// Writes were switched off with [`InMemoryBackend::set_unavailable`].
    #[error("Backend unavailable")]
    Unavailable,
    /// Variable store failed validation.
    #[error(transparent)]
    Variables(#[from] VariableError),
}

#[derive(Debug, Default)]
struct State {
    dialogs: BTreeMap<(String, String), PersistedDialog>,
    variables: BTreeMap<String, VariableStore>,
    save_log: Vec<PersistedDialog>,
    unavailable: bool,
}

/// Backend holding everything in memory.
///
/// Keeps a log of every dialog save so tests can assert on write counts and
/// contents.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RwLock<State>,
}

impl InMemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a dialog without logging a save.
    pub fn insert_dialog(&self, project_id: &str, dialog: PersistedDialog) {
        self.state
            .write()
            .dialogs
            .insert((project_id.to_string(), dialog.id.clone()), dialog);
    }

    /// Seed a project's variables without validation.
    pub fn insert_variables(&self, project_id: &str, store: VariableStore) {
        self.state.write().variables.insert(project_id.to_string(), store);
    }

    /// Current stored copy of a dialog.
    pub fn dialog(&self, project_id: &str, dialog_id: &str) -> Option<PersistedDialog> {
        self.state
            .read()
            .dialogs
            .get(&(project_id.to_string(), dialog_id.to_string()))
            .cloned()
    }

    /// Number of successful dialog saves.
    pub fn save_count(&self) -> usize {
        self.state.read().save_log.len()
    }

    /// Every successfully saved snapshot, oldest first.
    pub fn saves(&self) -> Vec<PersistedDialog> {
        self.state.read().save_log.clone()
    }

    /// Make every write fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }
}

#[async_trait]
impl DialogBackend for InMemoryBackend {
    type Error = InMemoryBackendError;

    async fn get_dialog_by_id(&self, project_id: &str, dialog_id: &str) -> Result<PersistedDialog, Self::Error> {
        self.dialog(project_id, dialog_id)
            .ok_or_else(|| InMemoryBackendError::DialogNotFound {
                project_id: project_id.to_string(),
                dialog_id: dialog_id.to_string(),
            })
    }

    async fn save_dialog(&self, project_id: &str, dialog: &PersistedDialog) -> Result<(), Self::Error> {
        let mut state = self.state.write();
        if state.unavailable {
            return Err(InMemoryBackendError::Unavailable);
        }
        state
            .dialogs
            .insert((project_id.to_string(), dialog.id.clone()), dialog.clone());
        state.save_log.push(dialog.clone());
        Ok(())
    }

    async fn load_variables(&self, project_id: &str) -> Result<VariableStore, Self::Error> {
        Ok(self.state.read().variables.get(project_id).cloned().unwrap_or_default())
    }

    async fn persist_variables(&self, project_id: &str, store: &VariableStore) -> Result<(), Self::Error> {
        store.validate()?;
        let mut state = self.state.write();
        if state.unavailable {
            return Err(InMemoryBackendError::Unavailable);
        }
        state.variables.insert(project_id.to_string(), store.clone());
        Ok(())
    }
}
