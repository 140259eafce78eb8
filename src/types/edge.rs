//! Edge and handle types for the dialogue graph.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::node::NodeId;

const CHOICE_PREFIX: &str = "choice-";
const BRANCH_PREFIX: &str = "branch-";

/// A stable outgoing connection point on a multi-output node.
///
/// Serialized as `choice-<id>` or `branch-<id>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Handle {
    /// Outgoing slot of one choice on a choice node.
    Choice(String),
    /// Outgoing slot of one branch on a phylum node.
    Branch(String),
}

impl Handle {
    /// Parse a source handle string. Routing handles such as `right-source`
    /// are not logical handles and return `None`.
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(id) = s.strip_prefix(CHOICE_PREFIX) {
            return Some(Self::Choice(id.to_string()));
        }
        s.strip_prefix(BRANCH_PREFIX).map(|id| Self::Branch(id.to_string()))
    }

    /// Handle for a choice id.
    pub fn choice(id: impl Into<String>) -> Self {
        Self::Choice(id.into())
    }

    /// Handle for a branch id.
    pub fn branch(id: impl Into<String>) -> Self {
        Self::Branch(id.into())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Choice(id) => write!(f, "{CHOICE_PREFIX}{id}"),
            Self::Branch(id) => write!(f, "{BRANCH_PREFIX}{id}"),
        }
    }
}

/// Directed connection between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Edge id. Only unique, never interpreted.
    pub id: String,
    /// Source node.
    pub source: NodeId,
    /// Target node.
    pub target: NodeId,
    /// Outgoing connection point on the source.
    #[serde(default, rename = "sourceHandle", skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Incoming connection point on the target.
    #[serde(default, rename = "targetHandle", skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    /// Create an edge with an id derived from its endpoints and handle.
    pub fn new(source: NodeId, target: NodeId, source_handle: Option<String>) -> Self {
        let id = match &source_handle {
            Some(handle) if Handle::parse(handle).is_some() => {
                format!("{source}-{handle}-{target}")
            }
            _ => format!("{source}-{target}"),
        };
        Self {
            id,
            source,
            target,
            source_handle,
            target_handle: None,
        }
    }

    /// Set the target handle.
    pub fn with_target_handle(mut self, handle: impl Into<String>) -> Self {
        self.target_handle = Some(handle.into());
        self
    }

    /// The logical handle on the source, if the edge leaves a choice or branch.
    pub fn handle(&self) -> Option<Handle> {
        self.source_handle.as_deref().and_then(Handle::parse)
    }

    /// Whether this edge leaves through the given logical handle.
    pub fn leaves_through(&self, handle: &Handle) -> bool {
        self.handle().as_ref() == Some(handle)
    }

    /// Identity of the edge ignoring id and routing handles.
    pub fn logical_key(&self) -> (NodeId, NodeId, Option<Handle>) {
        (self.source.clone(), self.target.clone(), self.handle())
    }
}
