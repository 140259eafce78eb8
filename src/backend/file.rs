//! JSON file backend.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<project>/dialogs/<dialog_id>.json
//! <root>/<project>/variables.json
//! ```
//!
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-write never leaves a truncated dialog behind.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use super::DialogBackend;
use crate::types::{PersistedDialog, VariableError, VariableStore};

/// Errors from the file backend.
#[derive(Debug, Error)]
pub enum FileBackendError {
    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON on disk, or unserializable value.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No file for this dialog.
    #[error("Dialog {dialog_id} not found in project {project_id}")]
    DialogNotFound {
        /// Project searched.
        project_id: String,
        /// Missing dialog.
        dialog_id: String,
    },

    /// Variable store failed validation.
    #[error(transparent)]
    Variables(#[from] VariableError),
}

/// Backend storing one JSON file per dialog.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Create a backend rooted at `root`. Directories are created on first
    /// write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a dialog file.
    pub fn dialog_path(&self, project_id: &str, dialog_id: &str) -> PathBuf {
        self.root
            .join(project_id)
            .join("dialogs")
            .join(format!("{dialog_id}.json"))
    }

    /// Path of a project's variables file.
    pub fn variables_path(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id).join("variables.json")
    }
}

async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), FileBackendError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl DialogBackend for FileBackend {
    type Error = FileBackendError;

    async fn get_dialog_by_id(&self, project_id: &str, dialog_id: &str) -> Result<PersistedDialog, Self::Error> {
        let path = self.dialog_path(project_id, dialog_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FileBackendError::DialogNotFound {
                    project_id: project_id.to_string(),
                    dialog_id: dialog_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    async fn save_dialog(&self, project_id: &str, dialog: &PersistedDialog) -> Result<(), Self::Error> {
        let path = self.dialog_path(project_id, &dialog.id);
        let content = serde_json::to_vec_pretty(dialog)?;
        write_atomic(&path, &content).await?;
        debug!(project_id, dialog_id = %dialog.id, path = %path.display(), "Dialog written");
        Ok(())
    }

    async fn load_variables(&self, project_id: &str) -> Result<VariableStore, Self::Error> {
        match fs::read_to_string(self.variables_path(project_id)).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(VariableStore::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist_variables(&self, project_id: &str, store: &VariableStore) -> Result<(), Self::Error> {
        store.validate()?;
        let content = serde_json::to_vec_pretty(store)?;
        write_atomic(&self.variables_path(project_id), &content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DialogVariable, Variable};

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dialog-graph-kernel-{name}-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_dialog_round_trip_on_disk() {
        let root = scratch_dir("dialogs");
        let backend = FileBackend::new(&root);
        let mut dialog = PersistedDialog::new("d1", "Intro", Some("hero".to_string()));
        dialog.characters_ids.push("hero".to_string());

        backend.save_dialog("p1", &dialog).await.unwrap();
        assert!(root.join("p1/dialogs/d1.json").exists());
        assert!(!root.join("p1/dialogs/d1.json.tmp").exists());

        let loaded = backend.get_dialog_by_id("p1", "d1").await.unwrap();
        assert_eq!(loaded, dialog);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_missing_dialog() {
        let backend = FileBackend::new(scratch_dir("missing"));
        assert!(matches!(
            backend.get_dialog_by_id("p1", "nope").await,
            Err(FileBackendError::DialogNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_variables_default_and_persist() {
        let root = scratch_dir("vars");
        let backend = FileBackend::new(&root);
        assert!(backend.load_variables("p1").await.unwrap().data.is_empty());

        let store = VariableStore::new(vec![Variable::Dialog(DialogVariable {
            id: "met".to_string(),
            name: "met".to_string(),
            current_state: "yes".to_string(),
            potential_states: vec!["yes".to_string(), "no".to_string()],
            dialog_id: "d1".to_string(),
        })]);
        backend.persist_variables("p1", &store).await.unwrap();
        assert_eq!(backend.load_variables("p1").await.unwrap(), store);

        std::fs::remove_dir_all(&root).unwrap();
    }
}
