//! Node types for the dialogue graph.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::necessity::NecessityExpression;

/// Name of the fallback branch every phylum node carries.
pub const DEFAULT_BRANCH_NAME: &str = "default";

/// Opaque identifier for a node in the dialogue graph.
///
/// Generated ids are UUID strings, but any string loaded from a persisted
/// dialog is accepted verbatim. Implements `Ord` so id-keyed maps iterate
/// deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of node, used when creating nodes and reporting mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A single line of dialogue.
    Dialog,
    /// A set of player choices.
    Choice,
    /// A conditional router.
    Phylum,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dialog => write!(f, "dialog"),
            Self::Choice => write!(f, "choice"),
            Self::Phylum => write!(f, "phylum"),
        }
    }
}

/// Canvas position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Create a position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Round both coordinates to the nearest integer.
    pub fn rounded(&self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }
}

/// A linear line of dialogue.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DialogLine {
    /// Text spoken on this line.
    pub content: String,
    /// Speaker. `None` inherits the speaker of the preceding dialog node.
    pub character_id: Option<String>,
    /// External text asset backing this line.
    pub content_link: Option<String>,
}

/// One option offered to the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Stable id, used to build the `choice-<id>` handle.
    pub id: String,
    /// Text shown to the player.
    pub content: String,
    /// Target of this choice, mirrored from its handle edge.
    pub next_node: Option<NodeId>,
}

impl Choice {
    /// Create a new unconnected choice with a generated id.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            next_node: None,
        }
    }
}

/// A set of player choices.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChoiceSet {
    /// Choices in display order.
    pub choices: Vec<Choice>,
}

impl ChoiceSet {
    /// Find a choice by id.
    pub fn choice(&self, choice_id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == choice_id)
    }
}

/// One prioritized branch of a phylum node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Stable id, used to build the `branch-<id>` handle.
    pub id: String,
    /// Display name. `"default"` marks the fallback branch.
    pub name: String,
    /// Higher priorities are evaluated first.
    pub priority: i32,
    /// Gate for this branch. `None` always matches.
    pub necessities: Option<NecessityExpression>,
    /// Target of this branch, mirrored from its handle edge.
    pub next_node: Option<NodeId>,
}

impl Condition {
    /// Create a new unconnected branch with a generated id.
    pub fn new(name: impl Into<String>, priority: i32, necessities: Option<NecessityExpression>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            priority,
            necessities,
            next_node: None,
        }
    }

    /// Create the fallback branch.
    pub fn fallback() -> Self {
        Self::new(DEFAULT_BRANCH_NAME, 0, None)
    }

    /// Whether this is the fallback branch.
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_BRANCH_NAME
    }
}

/// A conditional router node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phylum {
    /// Display name.
    pub name: String,
    /// Prioritized branches, including exactly one `"default"`.
    pub branches: Vec<Condition>,
}

impl Default for Phylum {
    fn default() -> Self {
        Self {
            name: String::new(),
            branches: vec![Condition::fallback()],
        }
    }
}

impl Phylum {
    /// Find a branch by id.
    pub fn branch(&self, branch_id: &str) -> Option<&Condition> {
        self.branches.iter().find(|b| b.id == branch_id)
    }

    /// Branches in evaluation order: priority descending, `"default"` last.
    ///
    /// The sort is stable, so equal priorities keep their authored order.
    pub fn evaluation_order(&self) -> Vec<&Condition> {
        let mut ordered: Vec<&Condition> = self.branches.iter().collect();
        ordered.sort_by(|a, b| {
            a.is_default()
                .cmp(&b.is_default())
                .then_with(|| b.priority.cmp(&a.priority))
        });
        ordered
    }
}

/// Type-tagged payload of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeData {
    /// A dialogue line.
    Dialog(DialogLine),
    /// A player choice set.
    Choices(ChoiceSet),
    /// A conditional router.
    Phylum(Phylum),
}

impl NodeData {
    /// Empty payload for a freshly created node of the given kind.
    pub fn empty(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Dialog => Self::Dialog(DialogLine::default()),
            NodeKind::Choice => Self::Choices(ChoiceSet::default()),
            NodeKind::Phylum => Self::Phylum(Phylum::default()),
        }
    }

    /// Kind of this payload.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Dialog(_) => NodeKind::Dialog,
            Self::Choices(_) => NodeKind::Choice,
            Self::Phylum(_) => NodeKind::Phylum,
        }
    }
}

/// A node held by the graph model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node id.
    pub id: NodeId,
    /// Canvas position.
    pub position: Position,
    /// Typed payload.
    pub data: NodeData,
}

impl GraphNode {
    /// Create a node.
    pub fn new(id: NodeId, position: Position, data: NodeData) -> Self {
        Self { id, position, data }
    }

    /// Kind of this node.
    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    /// The dialogue payload, if this is a dialog node.
    pub fn as_dialog(&self) -> Option<&DialogLine> {
        match &self.data {
            NodeData::Dialog(line) => Some(line),
            _ => None,
        }
    }

    /// The choice payload, if this is a choice node.
    pub fn as_choices(&self) -> Option<&ChoiceSet> {
        match &self.data {
            NodeData::Choices(set) => Some(set),
            _ => None,
        }
    }

    /// The router payload, if this is a phylum node.
    pub fn as_phylum(&self) -> Option<&Phylum> {
        match &self.data {
            NodeData::Phylum(phylum) => Some(phylum),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(name: &str, priority: i32) -> Condition {
        Condition {
            id: name.to_string(),
            name: name.to_string(),
            priority,
            necessities: None,
            next_node: None,
        }
    }

    #[test]
    fn test_default_branch_sorts_last() {
        let phylum = Phylum {
            name: "gate".to_string(),
            branches: vec![branch("default", 100), branch("low", 5), branch("high", 10)],
        };

        let order: Vec<&str> = phylum.evaluation_order().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(order, vec!["high", "low", "default"]);
    }

    #[test]
    fn test_equal_priorities_keep_authored_order() {
        let phylum = Phylum {
            name: String::new(),
            branches: vec![branch("a", 1), branch("b", 1), branch("default", 1)],
        };

        let order: Vec<&str> = phylum.evaluation_order().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "default"]);
    }

    #[test]
    fn test_new_phylum_has_fallback() {
        let phylum = Phylum::default();
        assert_eq!(phylum.branches.len(), 1);
        assert!(phylum.branches[0].is_default());
        assert!(phylum.branches[0].necessities.is_none());
    }

    #[test]
    fn test_position_rounding() {
        assert_eq!(Position::new(10.4, -3.6).rounded(), (10, -4));
    }
}
