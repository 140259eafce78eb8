//! Editing session for one dialog.
//!
//! [`DialogEditor`] holds the project, the dialog header and the live graph,
//! and forwards every mutation to the persistence scheduler. State is passed
//! in explicitly when the editor is opened.

use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::DialogBackend;
use crate::graph::{ChangeKind, DialogGraph, GraphError, NodePatch};
use crate::path::feed;
use crate::persistence::{PersistenceError, PersistenceScheduler, SavePolicy, SchedulerStatus};
use crate::play::{PlayEngine, PlayError};
use crate::serialization::{from_persisted, to_persisted, DialogHeader};
use crate::types::{Edge, GraphNode, NecessityExpression, NodeId, NodeKind, PersistedDialog, Position, VariableError};

/// Errors surfaced by the editor.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// The backend could not provide the dialog or variables.
    #[error("Backend error: {0}")]
    Backend(String),
    /// Invalid graph mutation.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Save failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    /// Incoherent variable store.
    #[error(transparent)]
    Variables(#[from] VariableError),
    /// Invalid play action.
    #[error(transparent)]
    Play(#[from] PlayError),
}

impl EditorError {
    fn from_backend(e: impl std::fmt::Display) -> Self {
        Self::Backend(e.to_string())
    }
}

/// An open dialog with its save worker.
#[derive(Debug)]
pub struct DialogEditor<B: DialogBackend + 'static> {
    project_id: String,
    header: DialogHeader,
    graph: DialogGraph,
    backend: Arc<B>,
    scheduler: PersistenceScheduler,
    last_appended: Option<NodeId>,
}

impl<B: DialogBackend + 'static> DialogEditor<B> {
    /// Load a dialog and start its save worker.
    pub async fn open(
        backend: Arc<B>,
        project_id: impl Into<String>,
        dialog_id: &str,
        policy: SavePolicy,
    ) -> Result<Self, EditorError> {
        let project_id = project_id.into();
        let persisted = backend
            .get_dialog_by_id(&project_id, dialog_id)
            .await
            .map_err(EditorError::from_backend)?;
        let (header, graph) = from_persisted(&persisted);
        info!(project_id = %project_id, dialog_id, nodes = graph.num_nodes(), "Dialog opened");

        let scheduler = PersistenceScheduler::spawn(Arc::clone(&backend), project_id.clone(), policy);
        Ok(Self {
            project_id,
            header,
            graph,
            backend,
            scheduler,
            last_appended: None,
        })
    }

    /// Create an empty dialog, write it immediately and open it.
    pub async fn create(
        backend: Arc<B>,
        project_id: impl Into<String>,
        name: impl Into<String>,
        main_character: Option<String>,
        policy: SavePolicy,
    ) -> Result<Self, EditorError> {
        let project_id = project_id.into();
        let dialog = PersistedDialog::new(uuid::Uuid::new_v4().to_string(), name, main_character);
        let (header, graph) = from_persisted(&dialog);

        let scheduler = PersistenceScheduler::spawn(Arc::clone(&backend), project_id.clone(), policy);
        scheduler.save(dialog).await?;
        info!(project_id = %project_id, dialog_id = %header.id, "Dialog created");
        Ok(Self {
            project_id,
            header,
            graph,
            backend,
            scheduler,
            last_appended: None,
        })
    }

    /// Project the dialog belongs to.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Dialog id.
    pub fn dialog_id(&self) -> &str {
        &self.header.id
    }

    /// Dialog fields outside the graph.
    pub fn header(&self) -> &DialogHeader {
        &self.header
    }

    /// The live graph.
    pub fn graph(&self) -> &DialogGraph {
        &self.graph
    }

    /// All nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.nodes()
    }

    /// All edges.
    pub fn edges(&self) -> &[Edge] {
        self.graph.edges()
    }

    /// Entry point.
    pub fn root(&self) -> Option<&NodeId> {
        self.graph.root()
    }

    /// Nodes along the longest path from the root.
    pub fn feed(&self) -> Vec<&GraphNode> {
        feed(&self.graph)
    }

    /// Save worker counters.
    pub fn save_status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    /// Current persisted form of the dialog.
    pub fn snapshot(&self) -> PersistedDialog {
        to_persisted(&self.graph, &self.header)
    }

    fn report(&self, kind: ChangeKind) {
        let (graph, header) = (&self.graph, &self.header);
        self.scheduler.notify(kind, || to_persisted(graph, header));
    }

    fn apply(&mut self, result: Result<ChangeKind, GraphError>) -> Result<ChangeKind, EditorError> {
        let kind = result?;
        self.report(kind);
        Ok(kind)
    }

    /// Create an empty node.
    pub fn create_node(&mut self, kind: NodeKind, position: Position) -> NodeId {
        let id = self.graph.create_node(kind, position);
        debug!(node_id = %id, %kind, "Node created");
        self.report(ChangeKind::Structural);
        id
    }

    /// Create a dialog node chained after the previously appended one.
    pub fn append_dialog_node(&mut self, position: Position) -> Result<NodeId, EditorError> {
        let id = self.graph.create_node(NodeKind::Dialog, position);
        if let Some(previous) = self.last_appended.take() {
            if self.graph.node(&previous).is_some() {
                self.graph.connect(&previous, &id, None)?;
            }
        }
        self.last_appended = Some(id.clone());
        self.report(ChangeKind::Structural);
        Ok(id)
    }

    /// See [`DialogGraph::connect`].
    pub fn connect(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        source_handle: Option<String>,
    ) -> Result<ChangeKind, EditorError> {
        let result = self.graph.connect(source, target, source_handle);
        self.apply(result)
    }

    /// See [`DialogGraph::update_node_data`].
    pub fn update_node_data(&mut self, id: &NodeId, patch: NodePatch) -> Result<ChangeKind, EditorError> {
        let result = self.graph.update_node_data(id, patch);
        self.apply(result)
    }

    /// See [`DialogGraph::move_node`].
    pub fn move_node(&mut self, id: &NodeId, position: Position) -> Result<ChangeKind, EditorError> {
        let result = self.graph.move_node(id, position);
        self.apply(result)
    }

    /// See [`DialogGraph::set_root`].
    pub fn set_root(&mut self, id: &NodeId) -> Result<ChangeKind, EditorError> {
        let result = self.graph.set_root(id);
        self.apply(result)
    }

    /// See [`DialogGraph::remove_node`].
    pub fn remove_node(&mut self, id: &NodeId) -> Result<ChangeKind, EditorError> {
        let result = self.graph.remove_node(id);
        self.apply(result)
    }

    /// See [`DialogGraph::remove_edge`].
    pub fn remove_edge(&mut self, edge_id: &str) -> Result<ChangeKind, EditorError> {
        let result = self.graph.remove_edge(edge_id);
        self.apply(result)
    }

    /// Add a choice, returning its id.
    pub fn add_choice(&mut self, id: &NodeId, content: impl Into<String>) -> Result<String, EditorError> {
        let choice_id = self.graph.add_choice(id, content)?;
        self.report(ChangeKind::Structural);
        Ok(choice_id)
    }

    /// See [`DialogGraph::remove_choice`].
    pub fn remove_choice(&mut self, id: &NodeId, choice_id: &str) -> Result<ChangeKind, EditorError> {
        let result = self.graph.remove_choice(id, choice_id);
        self.apply(result)
    }

    /// Add a branch, returning its id.
    pub fn add_branch(
        &mut self,
        id: &NodeId,
        name: impl Into<String>,
        priority: i32,
        necessities: Option<NecessityExpression>,
    ) -> Result<String, EditorError> {
        let branch_id = self.graph.add_branch(id, name, priority, necessities)?;
        self.report(ChangeKind::Structural);
        Ok(branch_id)
    }

    /// See [`DialogGraph::remove_branch`].
    pub fn remove_branch(&mut self, id: &NodeId, branch_id: &str) -> Result<ChangeKind, EditorError> {
        let result = self.graph.remove_branch(id, branch_id);
        self.apply(result)
    }

    /// See [`DialogGraph::set_branch_condition`].
    pub fn set_branch_condition(
        &mut self,
        id: &NodeId,
        branch_id: &str,
        necessities: Option<NecessityExpression>,
    ) -> Result<ChangeKind, EditorError> {
        let result = self.graph.set_branch_condition(id, branch_id, necessities);
        self.apply(result)
    }

    /// Rename the dialog.
    pub fn rename(&mut self, name: impl Into<String>) -> ChangeKind {
        self.header.name = name.into();
        self.report(ChangeKind::Content);
        ChangeKind::Content
    }

    /// Change the fallback speaker.
    pub fn set_main_character(&mut self, main_character: Option<String>) -> ChangeKind {
        self.header.main_character = main_character;
        self.report(ChangeKind::Content);
        ChangeKind::Content
    }

    /// Write the current state now, bypassing the debounce.
    pub async fn save_dialog(&self) -> Result<(), EditorError> {
        self.scheduler.save(self.snapshot()).await?;
        Ok(())
    }

    /// Save, load variables, and start playing from the root.
    ///
    /// A failed save blocks play.
    pub async fn start_play(&self) -> Result<PlayEngine, EditorError> {
        self.save_dialog().await?;
        let store = self
            .backend
            .load_variables(&self.project_id)
            .await
            .map_err(EditorError::from_backend)?;
        store.validate()?;
        Ok(PlayEngine::with_variables(
            self.graph.clone(),
            self.header.main_character.clone(),
            store.data,
        ))
    }

    /// Flush any pending save and stop the save worker.
    pub async fn close(self) -> Result<(), EditorError> {
        info!(dialog_id = %self.header.id, "Closing dialog");
        self.scheduler.shutdown().await?;
        Ok(())
    }
}
