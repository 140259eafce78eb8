//! Core types for the dialogue graph kernel.

pub mod node;
pub mod edge;
pub mod necessity;
pub mod variable;
pub mod persisted;

pub use node::{
    Choice, ChoiceSet, Condition, DialogLine, GraphNode, NodeData, NodeId, NodeKind, Phylum,
    Position, DEFAULT_BRANCH_NAME,
};
pub use edge::{Edge, Handle};
pub use necessity::{NecessityExpression, NecessityTree, Operator, VarNecessity};
pub use variable::{
    CharacterVariable, CharacterVariableState, DialogVariable, GlobalCharacterVariable,
    GlobalVariable, Variable, VariableError, VariableStore,
};
pub use persisted::{PersistedDialog, PersistedDialogLine, PersistedNode, PersistedNodeData};
