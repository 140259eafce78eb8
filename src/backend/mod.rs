//! Dialog storage backends.
//!
//! The backend owns the persisted record shape and overwrites whole dialogs;
//! there is no partial update and no optimistic concurrency.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::types::{PersistedDialog, VariableStore};

/// Command interface to the dialog store.
#[async_trait]
pub trait DialogBackend: Send + Sync {
    /// Error type for backend operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch a dialog.
    async fn get_dialog_by_id(&self, project_id: &str, dialog_id: &str) -> Result<PersistedDialog, Self::Error>;

    /// Overwrite a dialog with a full snapshot. Idempotent.
    async fn save_dialog(&self, project_id: &str, dialog: &PersistedDialog) -> Result<(), Self::Error>;

    /// Load the project's variables. A project without variables yields an
    /// empty store.
    async fn load_variables(&self, project_id: &str) -> Result<VariableStore, Self::Error>;

    /// Persist the project's variables. Incoherent stores are rejected.
    async fn persist_variables(&self, project_id: &str, store: &VariableStore) -> Result<(), Self::Error>;
}

pub use file::{FileBackend, FileBackendError};
pub use memory::{InMemoryBackend, InMemoryBackendError};
