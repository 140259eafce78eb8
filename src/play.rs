//! Runtime walk of a dialogue graph.
//!
//! The engine owns its copy of the graph, so edits made in the editor while
//! playing do not affect a running session until the next start.
//!
//! Phylum nodes resolve automatically inside the same call that reaches them:
//! branches are tried in evaluation order and the first one whose condition
//! holds decides the next node. They are recorded in the history but never
//! shown as a step. Resolution waits until variables have been provided.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::condition::evaluate;
use crate::graph::DialogGraph;
use crate::types::{Choice, Handle, NodeData, NodeId, Variable};

/// Where the walk currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayState {
    /// Showing a node; [`PlayEngine::advance`] moves on. A phylum node stays
    /// here only while variables are loading.
    Advancing(NodeId),
    /// Waiting for the player to pick a choice.
    AwaitingChoice {
        /// The choice node.
        node: NodeId,
        /// Its position in the history.
        history_index: usize,
    },
    /// Nothing left to visit.
    Ended,
}

/// Errors from driving the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayError {
    /// `select_choice` outside a choice node.
    #[error("Not waiting for a choice")]
    NotAwaitingChoice,
    /// `advance` while a choice is pending.
    #[error("Waiting for a choice at history index {0}")]
    ChoicePending(usize),
    /// The selection targets a different history entry than the pending one.
    #[error("Choice pending at history index {expected}, got {actual}")]
    WrongHistoryIndex {
        /// Index of the pending choice.
        expected: usize,
        /// Index given.
        actual: usize,
    },
    /// A choice was already recorded for this history entry.
    #[error("Choice already made at history index {0}")]
    ChoiceAlreadyMade(usize),
    /// The choice id does not exist on the node.
    #[error("Unknown choice: {0}")]
    UnknownChoice(String),
    /// A phylum node cannot resolve before variables are loaded.
    #[error("Variables are still loading")]
    VariablesPending,
}

/// What a visible history entry shows.
#[derive(Debug, Clone, PartialEq)]
pub enum StepContent<'a> {
    /// A spoken line.
    Dialog {
        /// Line text.
        content: &'a str,
        /// Resolved speaker.
        speaker: Option<&'a str>,
    },
    /// A choice prompt.
    Choice {
        /// Offered choices.
        choices: &'a [Choice],
        /// The recorded selection, if made.
        selected: Option<&'a str>,
    },
}

/// One visible entry of the play history.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayStep<'a> {
    /// Position in the full history.
    pub history_index: usize,
    /// Node shown.
    pub node_id: &'a NodeId,
    /// What it shows.
    pub content: StepContent<'a>,
    /// Whether this is the step the player is currently on.
    pub is_active: bool,
}

/// State machine walking a dialogue graph.
#[derive(Debug, Clone)]
pub struct PlayEngine {
    graph: DialogGraph,
    main_character: Option<String>,
    variables: Option<Vec<Variable>>,
    state: PlayState,
    history: Vec<NodeId>,
    choices_made: BTreeMap<usize, String>,
}

impl PlayEngine {
    /// Create an engine positioned at the root. Phylum nodes wait until
    /// [`provide_variables`](Self::provide_variables) is called.
    pub fn new(graph: DialogGraph, main_character: Option<String>) -> Self {
        let mut engine = Self {
            graph,
            main_character,
            variables: None,
            state: PlayState::Ended,
            history: Vec::new(),
            choices_made: BTreeMap::new(),
        };
        engine.restart();
        engine
    }

    /// Create an engine with variables already loaded.
    pub fn with_variables(graph: DialogGraph, main_character: Option<String>, variables: Vec<Variable>) -> Self {
        let mut engine = Self::new(graph, main_character);
        engine.provide_variables(variables);
        engine
    }

    /// Current state.
    pub fn state(&self) -> &PlayState {
        &self.state
    }

    /// Every visited node, phylum nodes included.
    pub fn history(&self) -> &[NodeId] {
        &self.history
    }

    /// Recorded selections by history index.
    pub fn choices_made(&self) -> &BTreeMap<usize, String> {
        &self.choices_made
    }

    /// Whether the walk is over.
    pub fn is_ended(&self) -> bool {
        self.state == PlayState::Ended
    }

    /// Whether variables have been provided.
    pub fn variables_loaded(&self) -> bool {
        self.variables.is_some()
    }

    /// The graph being played.
    pub fn graph(&self) -> &DialogGraph {
        &self.graph
    }

    /// Supply variable values and resolve a waiting phylum node.
    pub fn provide_variables(&mut self, variables: Vec<Variable>) {
        self.variables = Some(variables);
        if let PlayState::Advancing(current) = &self.state {
            let current = current.clone();
            self.settle(current);
        }
    }

    /// Return to the root with an empty history. The graph and variables are
    /// kept.
    pub fn restart(&mut self) {
        self.history.clear();
        self.choices_made.clear();
        self.state = PlayState::Ended;
        if let Some(root) = self.graph.root().cloned() {
            self.enter(root);
        }
        debug!(state = ?self.state, "Play restarted");
    }

    /// Move past the current dialog node.
    pub fn advance(&mut self) -> Result<&PlayState, PlayError> {
        match &self.state {
            PlayState::Ended => {}
            PlayState::AwaitingChoice { history_index, .. } => {
                return Err(PlayError::ChoicePending(*history_index));
            }
            PlayState::Advancing(current) => {
                let current = current.clone();
                let is_phylum = matches!(self.graph.node(&current).map(|n| &n.data), Some(NodeData::Phylum(_)));
                if is_phylum {
                    return Err(PlayError::VariablesPending);
                }
                match self.graph.next_of(&current, None).cloned() {
                    Some(next) => self.enter(next),
                    None => self.state = PlayState::Ended,
                }
            }
        }
        Ok(&self.state)
    }

    /// Record the player's choice at `history_index` and move on.
    ///
    /// A recorded choice cannot be changed until [`restart`](Self::restart).
    pub fn select_choice(&mut self, history_index: usize, choice_id: &str) -> Result<&PlayState, PlayError> {
        if self.choices_made.contains_key(&history_index) {
            return Err(PlayError::ChoiceAlreadyMade(history_index));
        }
        let (node_id, expected) = match &self.state {
            PlayState::AwaitingChoice { node, history_index } => (node.clone(), *history_index),
            _ => return Err(PlayError::NotAwaitingChoice),
        };
        if expected != history_index {
            return Err(PlayError::WrongHistoryIndex {
                expected,
                actual: history_index,
            });
        }

        let stored_target = self
            .graph
            .node(&node_id)
            .and_then(|n| n.as_choices())
            .and_then(|set| set.choice(choice_id))
            .map(|choice| choice.next_node.clone())
            .ok_or_else(|| PlayError::UnknownChoice(choice_id.to_string()))?;

        self.choices_made.insert(history_index, choice_id.to_string());
        let target = self
            .graph
            .next_of(&node_id, Some(&Handle::choice(choice_id)))
            .cloned()
            .or(stored_target);
        debug!(node_id = %node_id, choice_id, target = ?target, "Choice made");

        match target {
            Some(next) => self.enter(next),
            None => self.state = PlayState::Ended,
        }
        Ok(&self.state)
    }

    /// Speaker of the dialog node at `history_index`: its own character,
    /// else the nearest earlier dialog node with one, else the main
    /// character.
    pub fn speaker_for(&self, history_index: usize) -> Option<&str> {
        let line = self
            .history
            .get(history_index)
            .and_then(|id| self.graph.node(id))
            .and_then(|n| n.as_dialog())?;
        line.character_id
            .as_deref()
            .or_else(|| self.last_speaker_before(history_index))
            .or(self.main_character.as_deref())
    }

    /// The most recent speaker in the history, else the main character.
    pub fn current_speaker(&self) -> Option<&str> {
        self.last_speaker_before(self.history.len())
            .or(self.main_character.as_deref())
    }

    /// Dialog and choice entries of the history in visitation order.
    pub fn visible_steps(&self) -> Vec<PlayStep<'_>> {
        let last = self.history.len().checked_sub(1);
        self.history
            .iter()
            .enumerate()
            .filter_map(|(history_index, node_id)| {
                let node = self.graph.node(node_id)?;
                let content = match &node.data {
                    NodeData::Dialog(line) => StepContent::Dialog {
                        content: &line.content,
                        speaker: self.speaker_for(history_index),
                    },
                    NodeData::Choices(set) => StepContent::Choice {
                        choices: &set.choices,
                        selected: self.choices_made.get(&history_index).map(String::as_str),
                    },
                    NodeData::Phylum(_) => return None,
                };
                Some(PlayStep {
                    history_index,
                    node_id,
                    content,
                    is_active: Some(history_index) == last && !self.is_ended(),
                })
            })
            .collect()
    }

    fn last_speaker_before(&self, history_index: usize) -> Option<&str> {
        self.history[..history_index.min(self.history.len())]
            .iter()
            .rev()
            .filter_map(|id| self.graph.node(id).and_then(|n| n.as_dialog()))
            .find_map(|line| line.character_id.as_deref())
    }

    /// Push `id` onto the history and settle on it.
    fn enter(&mut self, id: NodeId) {
        if self.graph.node(&id).is_none() {
            warn!(node_id = %id, "Play reached a missing node, ending");
            self.state = PlayState::Ended;
            return;
        }
        self.history.push(id.clone());
        self.settle(id);
    }

    /// Set the state for the node at the end of the history, resolving phylum
    /// nodes until a dialog or choice node is reached.
    fn settle(&mut self, mut current: NodeId) {
        let mut routed = BTreeSet::new();
        loop {
            let Some(node) = self.graph.node(&current) else {
                self.state = PlayState::Ended;
                return;
            };
            match &node.data {
                NodeData::Dialog(_) => {
                    self.state = PlayState::Advancing(current);
                    return;
                }
                NodeData::Choices(_) => {
                    self.state = PlayState::AwaitingChoice {
                        node: current,
                        history_index: self.history.len() - 1,
                    };
                    return;
                }
                NodeData::Phylum(phylum) => {
                    let Some(variables) = &self.variables else {
                        self.state = PlayState::Advancing(current);
                        return;
                    };
                    if !routed.insert(current.clone()) {
                        warn!(node_id = %current, "Phylum nodes route in a cycle, ending");
                        self.state = PlayState::Ended;
                        return;
                    }

                    let chosen = phylum
                        .evaluation_order()
                        .into_iter()
                        .find(|branch| branch.is_default() || evaluate(branch.necessities.as_ref(), variables));
                    let target = chosen.and_then(|branch| {
                        self.graph
                            .next_of(&current, Some(&Handle::branch(branch.id.clone())))
                            .cloned()
                            .or_else(|| branch.next_node.clone())
                    });
                    debug!(
                        node_id = %current,
                        branch = chosen.map(|b| b.name.as_str()),
                        target = ?target,
                        "Phylum resolved"
                    );

                    match target.filter(|t| self.graph.node(t).is_some()) {
                        Some(next) => {
                            self.history.push(next.clone());
                            current = next;
                        }
                        None => {
                            self.state = PlayState::Ended;
                            return;
                        }
                    }
                }
            }
        }
    }
}
