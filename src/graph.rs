//! In-memory dialogue graph.
//!
//! Nodes live in an id-keyed arena; edges are a flat list in insertion order.
//! Adjacency is derived on demand (see [`crate::path`]), so nodes never hold
//! references to each other and cycles need no special ownership handling.
//!
//! Every mutation returns the [`ChangeKind`] it represents so the caller can
//! forward it to the persistence scheduler.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{
    Choice, Condition, Edge, GraphNode, Handle, NecessityExpression, NodeData, NodeId, NodeKind,
    Position,
};

/// Classification of a mutation for save scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Node or edge added or removed, or root changed.
    Structural,
    /// Field edited inside an existing node.
    Content,
    /// Node dragged.
    Position,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural => write!(f, "structural"),
            Self::Content => write!(f, "content"),
            Self::Position => write!(f, "position"),
        }
    }
}

/// Error type for graph mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Node not found.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    /// Edge not found.
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),
    /// Operation expected a different node kind.
    #[error("Node {node_id} is a {found} node, expected {expected}")]
    KindMismatch {
        /// Node the operation targeted.
        node_id: NodeId,
        /// Kind the operation needs.
        expected: NodeKind,
        /// Actual kind.
        found: NodeKind,
    },
    /// A multi-output node was connected without a source handle.
    #[error("Node {0} needs a source handle to connect")]
    MissingHandle(NodeId),
    /// The source handle does not name a choice or branch of the node.
    #[error("Node {node_id} has no handle {handle}")]
    UnknownHandle {
        /// Source node.
        node_id: NodeId,
        /// Handle as given.
        handle: String,
    },
    /// Choice not found on a choice node.
    #[error("Choice {choice_id} not found on node {node_id}")]
    ChoiceNotFound {
        /// Choice node.
        node_id: NodeId,
        /// Missing choice.
        choice_id: String,
    },
    /// Branch not found on a phylum node.
    #[error("Branch {branch_id} not found on node {node_id}")]
    BranchNotFound {
        /// Phylum node.
        node_id: NodeId,
        /// Missing branch.
        branch_id: String,
    },
    /// The fallback branch cannot be removed or conditioned.
    #[error("Default branch of node {0} cannot be removed or given a condition")]
    DefaultBranchProtected(NodeId),
    /// A branch list does not contain exactly one unconditioned default.
    #[error("Node {0} must keep exactly one unconditioned default branch")]
    InvalidDefaultBranch(NodeId),
}

/// Partial update of a dialog node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogPatch {
    /// New text.
    pub content: Option<String>,
    /// New speaker; `Some(None)` clears it.
    pub character_id: Option<Option<String>>,
    /// New text asset; `Some(None)` clears it.
    pub content_link: Option<Option<String>>,
}

/// Partial update of a choice node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoicePatch {
    /// Replacement choice list.
    pub choices: Option<Vec<Choice>>,
}

/// Partial update of a phylum node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhylumPatch {
    /// New name.
    pub name: Option<String>,
    /// Replacement branch list.
    pub branches: Option<Vec<Condition>>,
}

/// Shallow partial update of a node payload. The variant must match the
/// node's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum NodePatch {
    /// Patch a dialog node.
    Dialog(DialogPatch),
    /// Patch a choice node.
    Choices(ChoicePatch),
    /// Patch a phylum node.
    Phylum(PhylumPatch),
}

impl NodePatch {
    fn kind(&self) -> NodeKind {
        match self {
            Self::Dialog(_) => NodeKind::Dialog,
            Self::Choices(_) => NodeKind::Choice,
            Self::Phylum(_) => NodeKind::Phylum,
        }
    }
}

/// The dialogue graph: nodes, edges and the designated entry point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogGraph {
    nodes: BTreeMap<NodeId, GraphNode>,
    edges: Vec<Edge>,
    root: Option<NodeId>,
}

impl DialogGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a graph from loaded parts.
    ///
    /// Edges whose endpoints are missing are dropped, and a root that does not
    /// reference a node is cleared.
    pub fn from_parts(nodes: Vec<GraphNode>, edges: Vec<Edge>, root: Option<NodeId>) -> Self {
        let nodes: BTreeMap<NodeId, GraphNode> =
            nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        let edges = edges
            .into_iter()
            .filter(|e| nodes.contains_key(&e.source) && nodes.contains_key(&e.target))
            .collect();
        let root = root.filter(|r| nodes.contains_key(r));
        Self { nodes, edges, root }
    }

    /// Get a node by id.
    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// All nodes, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Entry point.
    pub fn root(&self) -> Option<&NodeId> {
        self.root.as_ref()
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Outgoing edges of a node, in edge order.
    pub fn outgoing<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| &e.source == id)
    }

    /// Target of the first live edge leaving `id`, restricted to `handle`
    /// when one is given.
    pub fn next_of(&self, id: &NodeId, handle: Option<&Handle>) -> Option<&NodeId> {
        self.edges
            .iter()
            .find(|e| &e.source == id && handle.map_or(true, |h| e.leaves_through(h)))
            .map(|e| &e.target)
    }

    /// Allocate a new empty node. The first node of an empty graph becomes
    /// the root.
    pub fn create_node(&mut self, kind: NodeKind, position: Position) -> NodeId {
        let id = NodeId::generate();
        self.insert_node(GraphNode::new(id.clone(), position, NodeData::empty(kind)));
        id
    }

    /// Insert a fully built node, replacing any node with the same id. The
    /// first node of an empty graph becomes the root.
    pub fn insert_node(&mut self, node: GraphNode) -> ChangeKind {
        if self.nodes.is_empty() {
            self.root = Some(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
        ChangeKind::Structural
    }

    /// Connect `source` to `target`.
    ///
    /// A dialog source keeps a single successor: its previous outgoing edge is
    /// replaced. Choice and phylum sources need a `choice-<id>` / `branch-<id>`
    /// handle; only the edge on that same handle is replaced.
    pub fn connect(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        source_handle: Option<String>,
    ) -> Result<ChangeKind, GraphError> {
        let source_kind = self.kind_of(source)?;
        if !self.nodes.contains_key(target) {
            return Err(GraphError::NodeNotFound(target.clone()));
        }

        match source_kind {
            NodeKind::Dialog => {
                self.edges.retain(|e| &e.source != source);
                self.edges.push(Edge::new(source.clone(), target.clone(), source_handle));
            }
            NodeKind::Choice | NodeKind::Phylum => {
                let raw = source_handle.ok_or_else(|| GraphError::MissingHandle(source.clone()))?;
                let handle = self.resolve_handle(source, source_kind, &raw)?;
                self.edges
                    .retain(|e| !(&e.source == source && e.leaves_through(&handle)));
                self.edges.push(Edge::new(source.clone(), target.clone(), Some(raw)));
                self.mirror_handle_target(source, &handle, Some(target.clone()));
            }
        }
        Ok(ChangeKind::Structural)
    }

    /// Shallow-merge a patch into a node's payload. Never changes node type.
    ///
    /// Replacing a choice or branch list drops the edges of handles that no
    /// longer exist and re-mirrors `next_node` from the live edges.
    pub fn update_node_data(&mut self, id: &NodeId, patch: NodePatch) -> Result<ChangeKind, GraphError> {
        let found = self.kind_of(id)?;
        if patch.kind() != found {
            return Err(GraphError::KindMismatch {
                node_id: id.clone(),
                expected: patch.kind(),
                found,
            });
        }
        if let NodePatch::Phylum(PhylumPatch { branches: Some(branches), .. }) = &patch {
            validate_default_branch(id, branches)?;
        }

        let node = self.nodes.get_mut(id).ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        let mut handles_changed = false;
        match (&mut node.data, patch) {
            (NodeData::Dialog(line), NodePatch::Dialog(p)) => {
                if let Some(content) = p.content {
                    line.content = content;
                }
                if let Some(character_id) = p.character_id {
                    line.character_id = character_id;
                }
                if let Some(content_link) = p.content_link {
                    line.content_link = content_link;
                }
            }
            (NodeData::Choices(set), NodePatch::Choices(p)) => {
                if let Some(choices) = p.choices {
                    set.choices = choices;
                    handles_changed = true;
                }
            }
            (NodeData::Phylum(phylum), NodePatch::Phylum(p)) => {
                if let Some(name) = p.name {
                    phylum.name = name;
                }
                if let Some(branches) = p.branches {
                    phylum.branches = branches;
                    handles_changed = true;
                }
            }
            (data, patch) => return Err(kind_mismatch(id, patch.kind(), data.kind())),
        }

        if handles_changed {
            self.resync_handles(id);
        }
        Ok(ChangeKind::Content)
    }

    /// Move a node on the canvas.
    pub fn move_node(&mut self, id: &NodeId, position: Position) -> Result<ChangeKind, GraphError> {
        let node = self.nodes.get_mut(id).ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        node.position = position;
        Ok(ChangeKind::Position)
    }

    /// Reassign the entry point. Reachability of other nodes is not checked.
    pub fn set_root(&mut self, id: &NodeId) -> Result<ChangeKind, GraphError> {
        if !self.nodes.contains_key(id) {
            return Err(GraphError::NodeNotFound(id.clone()));
        }
        self.root = Some(id.clone());
        Ok(ChangeKind::Structural)
    }

    /// Remove a node and every edge touching it. Removing the root clears it.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<ChangeKind, GraphError> {
        if self.nodes.remove(id).is_none() {
            return Err(GraphError::NodeNotFound(id.clone()));
        }

        let (dropped, kept): (Vec<Edge>, Vec<Edge>) = std::mem::take(&mut self.edges)
            .into_iter()
            .partition(|e| &e.source == id || &e.target == id);
        self.edges = kept;
        for edge in dropped.iter().filter(|e| &e.source != id) {
            if let Some(handle) = edge.handle() {
                self.mirror_handle_target(&edge.source, &handle, None);
            }
        }

        if self.root.as_ref() == Some(id) {
            self.root = None;
        }
        Ok(ChangeKind::Structural)
    }

    /// Remove an edge by id.
    pub fn remove_edge(&mut self, edge_id: &str) -> Result<ChangeKind, GraphError> {
        let index = self
            .edges
            .iter()
            .position(|e| e.id == edge_id)
            .ok_or_else(|| GraphError::EdgeNotFound(edge_id.to_string()))?;
        let edge = self.edges.remove(index);
        if let Some(handle) = edge.handle() {
            self.mirror_handle_target(&edge.source, &handle, None);
        }
        Ok(ChangeKind::Structural)
    }

    /// Append a choice to a choice node, returning the new choice id.
    pub fn add_choice(&mut self, id: &NodeId, content: impl Into<String>) -> Result<String, GraphError> {
        let set = match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Choices(set)) => set,
            Some(other) => return Err(kind_mismatch(id, NodeKind::Choice, other.kind())),
            None => return Err(GraphError::NodeNotFound(id.clone())),
        };
        let choice = Choice::new(content);
        let choice_id = choice.id.clone();
        set.choices.push(choice);
        Ok(choice_id)
    }

    /// Remove a choice and its outgoing edge.
    pub fn remove_choice(&mut self, id: &NodeId, choice_id: &str) -> Result<ChangeKind, GraphError> {
        let set = match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Choices(set)) => set,
            Some(other) => return Err(kind_mismatch(id, NodeKind::Choice, other.kind())),
            None => return Err(GraphError::NodeNotFound(id.clone())),
        };
        let before = set.choices.len();
        set.choices.retain(|c| c.id != choice_id);
        if set.choices.len() == before {
            return Err(GraphError::ChoiceNotFound {
                node_id: id.clone(),
                choice_id: choice_id.to_string(),
            });
        }
        let handle = Handle::choice(choice_id);
        self.edges.retain(|e| !(&e.source == id && e.leaves_through(&handle)));
        Ok(ChangeKind::Structural)
    }

    /// Add a conditional branch to a phylum node, returning the new branch id.
    pub fn add_branch(
        &mut self,
        id: &NodeId,
        name: impl Into<String>,
        priority: i32,
        necessities: Option<NecessityExpression>,
    ) -> Result<String, GraphError> {
        let phylum = match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Phylum(phylum)) => phylum,
            Some(other) => return Err(kind_mismatch(id, NodeKind::Phylum, other.kind())),
            None => return Err(GraphError::NodeNotFound(id.clone())),
        };
        let branch = Condition::new(name, priority, necessities);
        if branch.is_default() {
            return Err(GraphError::InvalidDefaultBranch(id.clone()));
        }
        let branch_id = branch.id.clone();
        phylum.branches.push(branch);
        Ok(branch_id)
    }

    /// Remove a non-default branch and its outgoing edge.
    pub fn remove_branch(&mut self, id: &NodeId, branch_id: &str) -> Result<ChangeKind, GraphError> {
        let phylum = match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Phylum(phylum)) => phylum,
            Some(other) => return Err(kind_mismatch(id, NodeKind::Phylum, other.kind())),
            None => return Err(GraphError::NodeNotFound(id.clone())),
        };
        let branch = phylum.branch(branch_id).ok_or_else(|| GraphError::BranchNotFound {
            node_id: id.clone(),
            branch_id: branch_id.to_string(),
        })?;
        if branch.is_default() {
            return Err(GraphError::DefaultBranchProtected(id.clone()));
        }
        phylum.branches.retain(|b| b.id != branch_id);
        let handle = Handle::branch(branch_id);
        self.edges.retain(|e| !(&e.source == id && e.leaves_through(&handle)));
        Ok(ChangeKind::Structural)
    }

    /// Replace the condition gating a non-default branch.
    pub fn set_branch_condition(
        &mut self,
        id: &NodeId,
        branch_id: &str,
        necessities: Option<NecessityExpression>,
    ) -> Result<ChangeKind, GraphError> {
        let phylum = match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Phylum(phylum)) => phylum,
            Some(other) => return Err(kind_mismatch(id, NodeKind::Phylum, other.kind())),
            None => return Err(GraphError::NodeNotFound(id.clone())),
        };
        let branch = phylum
            .branches
            .iter_mut()
            .find(|b| b.id == branch_id)
            .ok_or_else(|| GraphError::BranchNotFound {
                node_id: id.clone(),
                branch_id: branch_id.to_string(),
            })?;
        if branch.is_default() {
            return Err(GraphError::DefaultBranchProtected(id.clone()));
        }
        branch.necessities = necessities;
        Ok(ChangeKind::Content)
    }

    fn kind_of(&self, id: &NodeId) -> Result<NodeKind, GraphError> {
        self.nodes
            .get(id)
            .map(GraphNode::kind)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
    }

    /// Parse `raw` and check it names an existing choice/branch of `source`.
    fn resolve_handle(&self, source: &NodeId, kind: NodeKind, raw: &str) -> Result<Handle, GraphError> {
        let unknown = || GraphError::UnknownHandle {
            node_id: source.clone(),
            handle: raw.to_string(),
        };
        let handle = Handle::parse(raw).ok_or_else(unknown)?;
        let node = self.nodes.get(source).ok_or_else(|| GraphError::NodeNotFound(source.clone()))?;
        let exists = match (&handle, &node.data, kind) {
            (Handle::Choice(cid), NodeData::Choices(set), NodeKind::Choice) => set.choice(cid).is_some(),
            (Handle::Branch(bid), NodeData::Phylum(phylum), NodeKind::Phylum) => phylum.branch(bid).is_some(),
            _ => false,
        };
        if exists {
            Ok(handle)
        } else {
            Err(unknown())
        }
    }

    /// Keep the `next_node` stored on a choice/branch equal to its live edge.
    fn mirror_handle_target(&mut self, source: &NodeId, handle: &Handle, target: Option<NodeId>) {
        let Some(node) = self.nodes.get_mut(source) else {
            return;
        };
        match (&mut node.data, handle) {
            (NodeData::Choices(set), Handle::Choice(cid)) => {
                if let Some(choice) = set.choices.iter_mut().find(|c| &c.id == cid) {
                    choice.next_node = target;
                }
            }
            (NodeData::Phylum(phylum), Handle::Branch(bid)) => {
                if let Some(branch) = phylum.branches.iter_mut().find(|b| &b.id == bid) {
                    branch.next_node = target;
                }
            }
            _ => {}
        }
    }

    /// Drop edges on handles the node no longer has, then re-mirror targets.
    fn resync_handles(&mut self, id: &NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let live: Vec<Handle> = match &node.data {
            NodeData::Choices(set) => set.choices.iter().map(|c| Handle::choice(c.id.clone())).collect(),
            NodeData::Phylum(phylum) => phylum.branches.iter().map(|b| Handle::branch(b.id.clone())).collect(),
            NodeData::Dialog(_) => return,
        };

        self.edges
            .retain(|e| &e.source != id || e.handle().map_or(false, |h| live.contains(&h)));

        let targets: Vec<(Handle, Option<NodeId>)> = live
            .into_iter()
            .map(|h| {
                let target = self.next_of(id, Some(&h)).cloned();
                (h, target)
            })
            .collect();
        for (handle, target) in targets {
            self.mirror_handle_target(id, &handle, target);
        }
    }
}

fn kind_mismatch(id: &NodeId, expected: NodeKind, found: NodeKind) -> GraphError {
    GraphError::KindMismatch {
        node_id: id.clone(),
        expected,
        found,
    }
}

fn validate_default_branch(id: &NodeId, branches: &[Condition]) -> Result<(), GraphError> {
    let defaults: Vec<&Condition> = branches.iter().filter(|b| b.is_default()).collect();
    match defaults.as_slice() {
        [fallback] if fallback.necessities.is_none() => Ok(()),
        _ => Err(GraphError::InvalidDefaultBranch(id.clone())),
    }
}
