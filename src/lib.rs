//! # dialog-graph-kernel
//!
//! Branching dialogue as a typed directed graph, with editing, debounced
//! persistence and a runtime player.
//!
//! ## Architecture
//!
//! ```text
//! DialogEditor ── mutation ──→ DialogGraph
//!      │                           │
//!      │ ChangeKind        to_persisted / from_persisted
//!      ↓                           ↓
//! PersistenceScheduler ──→ DialogBackend (memory or JSON files)
//!
//! DialogGraph + Variables ──→ PlayEngine ──→ visible history
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Persisted node maps are ordered by id
//! - Adjacency preserves edge insertion order, so path ties resolve the same
//!   way on every run
//! - Condition evaluation is total: unknown variables are `false`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod graph;
pub mod serialization;
pub mod path;
pub mod condition;
pub mod persistence;
pub mod backend;
pub mod play;
pub mod editor;
pub mod canonical;

// Re-exports
pub use types::{
    Choice, ChoiceSet, Condition, DialogLine, Edge, GraphNode, Handle, NecessityExpression,
    NecessityTree, NodeData, NodeId, NodeKind, Operator, Phylum, Position, VarNecessity,
    DEFAULT_BRANCH_NAME,
};
pub use types::{
    CharacterVariable, CharacterVariableState, DialogVariable, GlobalCharacterVariable,
    GlobalVariable, Variable, VariableError, VariableStore,
};
pub use types::{PersistedDialog, PersistedDialogLine, PersistedNode, PersistedNodeData};
pub use graph::{ChangeKind, ChoicePatch, DialogGraph, DialogPatch, GraphError, NodePatch, PhylumPatch};
pub use serialization::{from_persisted, optimal_handles, to_persisted, DialogHeader, RoutingHandles};
pub use path::{feed, first_path, forward_map, longest_path, path_to, reverse_map, AdjacencyMap};
pub use condition::{evaluate, lint, ExpressionBuilder};
pub use persistence::{PersistenceError, PersistenceScheduler, SavePolicy, SchedulerStatus};
pub use backend::{DialogBackend, FileBackend, FileBackendError, InMemoryBackend, InMemoryBackendError};
pub use play::{PlayEngine, PlayError, PlayState, PlayStep, StepContent};
pub use editor::{DialogEditor, EditorError};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
