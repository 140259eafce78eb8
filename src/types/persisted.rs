//! Persisted record shapes exchanged with the backend.
//!
//! The backend stores edges implicitly: every outgoing link lives inside the
//! node payload as a `next_node` field. Node maps are `BTreeMap`s so the
//! serialized form is deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::node::{ChoiceSet, NodeId, Phylum};

/// Persisted dialogue line, carrying its single successor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedDialogLine {
    /// Text spoken on this line.
    #[serde(default)]
    pub content: String,
    /// Successor, if connected.
    pub next_node: Option<NodeId>,
    /// Speaker.
    pub character_id: Option<String>,
    /// External text asset.
    pub content_link: Option<String>,
}

/// Type-tagged persisted payload: `{"Dialog": ..}`, `{"Choices": ..}` or
/// `{"Phylum": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PersistedNodeData {
    /// A dialogue line.
    Dialog(PersistedDialogLine),
    /// A player choice set; each choice carries its own `next_node`.
    Choices(ChoiceSet),
    /// A conditional router; each branch carries its own `next_node`.
    #[serde(alias = "Conditions")]
    Phylum(Phylum),
}

/// Persisted node with integer canvas coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedNode {
    /// Node id, repeated from the map key.
    pub id: NodeId,
    /// Horizontal coordinate.
    pub pos_x: i32,
    /// Vertical coordinate.
    pub pos_y: i32,
    /// Typed payload.
    pub data: PersistedNodeData,
}

/// A whole dialog as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedDialog {
    /// Dialog id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Entry point.
    pub root_node: Option<NodeId>,
    /// Characters taking part in the dialog.
    #[serde(default)]
    pub characters_ids: Vec<String>,
    /// Creation time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Fallback speaker when no dialog node names one.
    pub main_character: Option<String>,
    /// Nodes by id.
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, PersistedNode>,
}

impl PersistedDialog {
    /// Create an empty dialog.
    pub fn new(id: impl Into<String>, name: impl Into<String>, main_character: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            root_node: None,
            characters_ids: Vec::new(),
            created_at: Utc::now(),
            main_character,
            nodes: BTreeMap::new(),
        }
    }
}
