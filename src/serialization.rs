//! Conversion between the in-memory graph and the persisted dialog record.
//!
//! The persisted form has no edge list: each link lives inside the node
//! payload as `next_node`. Loading rebuilds edges in a second pass once every
//! node exists, so links to missing nodes are dropped instead of dangling.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::warn;

use crate::graph::DialogGraph;
use crate::types::{
    Condition, DialogLine, Edge, GraphNode, Handle, NodeData, NodeId, PersistedDialog,
    PersistedDialogLine, PersistedNode, PersistedNodeData, Position, DEFAULT_BRANCH_NAME,
};

/// Rendered node width used for handle routing.
pub const NODE_WIDTH: f64 = 360.0;
/// Rendered node height used for handle routing.
pub const NODE_HEIGHT: f64 = 272.0;

/// Brings a loaded phylum back to exactly one unconditional default branch.
fn repair_default_branch(dialog_id: &str, node_id: &NodeId, branches: &mut Vec<Condition>) {
    let mut seen = 0usize;
    for branch in branches.iter_mut().filter(|b| b.is_default()) {
        seen += 1;
        if seen == 1 {
            if branch.necessities.take().is_some() {
                warn!(dialog_id, node_id = %node_id, "Default branch carried a condition, clearing it");
            }
        } else {
            branch.name = format!("{DEFAULT_BRANCH_NAME}-{seen}");
            warn!(dialog_id, node_id = %node_id, renamed = %branch.name, "Duplicate default branch, renaming");
        }
    }
    if seen == 0 {
        warn!(dialog_id, node_id = %node_id, "Phylum node without default branch, adding one");
        branches.push(Condition::fallback());
    }
}

/// Dialog fields that are not part of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogHeader {
    /// Dialog id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Characters taking part.
    pub characters_ids: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Fallback speaker.
    pub main_character: Option<String>,
}

impl DialogHeader {
    fn of(dialog: &PersistedDialog) -> Self {
        Self {
            id: dialog.id.clone(),
            name: dialog.name.clone(),
            characters_ids: dialog.characters_ids.clone(),
            created_at: dialog.created_at,
            main_character: dialog.main_character.clone(),
        }
    }
}

/// Source and target routing handles for an edge drawn between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingHandles {
    /// Side of the source the edge leaves from.
    pub source: &'static str,
    /// Side of the target the edge enters.
    pub target: &'static str,
}

/// Pick the sides to draw an edge between, by comparing node centres.
/// Horizontal wins ties.
pub fn optimal_handles(source: Position, target: Position) -> RoutingHandles {
    let dx = (target.x + NODE_WIDTH / 2.0) - (source.x + NODE_WIDTH / 2.0);
    let dy = (target.y + NODE_HEIGHT / 2.0) - (source.y + NODE_HEIGHT / 2.0);

    let (source, target) = if dx.abs() >= dy.abs() {
        if dx >= 0.0 {
            ("right-source", "left-target")
        } else {
            ("left-source", "right-target")
        }
    } else if dy >= 0.0 {
        ("bottom-source", "top-target")
    } else {
        ("top-source", "bottom-target")
    };
    RoutingHandles { source, target }
}

/// Serialize the graph into a persisted dialog.
///
/// A dialog node persists the target of its first outgoing edge. Choices and
/// branches persist the target of the edge on their own handle. Positions are
/// rounded to integers.
pub fn to_persisted(graph: &DialogGraph, header: &DialogHeader) -> PersistedDialog {
    let mut nodes = BTreeMap::new();

    for node in graph.nodes() {
        let next_through = |handle: Handle| graph.next_of(&node.id, Some(&handle)).cloned();

        let data = match &node.data {
            NodeData::Dialog(line) => PersistedNodeData::Dialog(PersistedDialogLine {
                content: line.content.clone(),
                next_node: graph.next_of(&node.id, None).cloned(),
                character_id: line.character_id.clone(),
                content_link: line.content_link.clone(),
            }),
            NodeData::Choices(set) => {
                let mut set = set.clone();
                for choice in &mut set.choices {
                    choice.next_node = next_through(Handle::choice(choice.id.clone()));
                }
                PersistedNodeData::Choices(set)
            }
            NodeData::Phylum(phylum) => {
                let mut phylum = phylum.clone();
                for branch in &mut phylum.branches {
                    branch.next_node = next_through(Handle::branch(branch.id.clone()));
                }
                PersistedNodeData::Phylum(phylum)
            }
        };

        let (pos_x, pos_y) = node.position.rounded();
        nodes.insert(
            node.id.clone(),
            PersistedNode {
                id: node.id.clone(),
                pos_x,
                pos_y,
                data,
            },
        );
    }

    PersistedDialog {
        id: header.id.clone(),
        name: header.name.clone(),
        root_node: graph.root().cloned(),
        characters_ids: header.characters_ids.clone(),
        created_at: header.created_at,
        main_character: header.main_character.clone(),
        nodes,
    }
}

/// Rebuild a graph from a persisted dialog.
pub fn from_persisted(dialog: &PersistedDialog) -> (DialogHeader, DialogGraph) {
    let exists = |id: &NodeId| dialog.nodes.contains_key(id);
    let live_target = |source: &NodeId, target: &Option<NodeId>| -> Option<NodeId> {
        match target {
            Some(t) if exists(t) => Some(t.clone()),
            Some(t) => {
                warn!(dialog_id = %dialog.id, source = %source, target = %t, "Dropping link to missing node");
                None
            }
            None => None,
        }
    };

    let mut nodes = Vec::with_capacity(dialog.nodes.len());
    let mut edges = Vec::new();

    for (id, persisted) in &dialog.nodes {
        let source_pos = position_of(persisted);
        let route = |target: &NodeId| {
            let target_pos = dialog.nodes.get(target).map(position_of).unwrap_or_default();
            optimal_handles(source_pos, target_pos)
        };

        let data = match &persisted.data {
            PersistedNodeData::Dialog(line) => {
                if let Some(target) = live_target(id, &line.next_node) {
                    let handles = route(&target);
                    edges.push(
                        Edge::new(id.clone(), target, Some(handles.source.to_string()))
                            .with_target_handle(handles.target),
                    );
                }
                NodeData::Dialog(DialogLine {
                    content: line.content.clone(),
                    character_id: line.character_id.clone(),
                    content_link: line.content_link.clone(),
                })
            }
            PersistedNodeData::Choices(set) => {
                let mut set = set.clone();
                for choice in &mut set.choices {
                    choice.next_node = live_target(id, &choice.next_node);
                    if let Some(target) = &choice.next_node {
                        edges.push(
                            Edge::new(id.clone(), target.clone(), Some(Handle::choice(choice.id.clone()).to_string()))
                                .with_target_handle(route(target).target),
                        );
                    }
                }
                NodeData::Choices(set)
            }
            PersistedNodeData::Phylum(phylum) => {
                let mut phylum = phylum.clone();
                repair_default_branch(&dialog.id, id, &mut phylum.branches);
                for branch in &mut phylum.branches {
                    branch.next_node = live_target(id, &branch.next_node);
                    if let Some(target) = &branch.next_node {
                        edges.push(
                            Edge::new(id.clone(), target.clone(), Some(Handle::branch(branch.id.clone()).to_string()))
                                .with_target_handle(route(target).target),
                        );
                    }
                }
                NodeData::Phylum(phylum)
            }
        };

        nodes.push(GraphNode::new(id.clone(), source_pos, data));
    }

    let root = match &dialog.root_node {
        Some(root) if !exists(root) => {
            warn!(dialog_id = %dialog.id, root = %root, "Root node missing, clearing");
            None
        }
        other => other.clone(),
    };

    (DialogHeader::of(dialog), DialogGraph::from_parts(nodes, edges, root))
}

fn position_of(node: &PersistedNode) -> Position {
    Position::new(f64::from(node.pos_x), f64::from(node.pos_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Choice, ChoiceSet, NecessityExpression, NodeKind, Phylum};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn header() -> DialogHeader {
        DialogHeader {
            id: "d1".to_string(),
            name: "Intro".to_string(),
            characters_ids: vec!["hero".to_string()],
            created_at: Utc::now(),
            main_character: Some("hero".to_string()),
        }
    }

    fn logical_edges(graph: &DialogGraph) -> BTreeSet<(NodeId, NodeId, Option<Handle>)> {
        graph.edges().iter().map(Edge::logical_key).collect()
    }

    #[test]
    fn test_optimal_handles() {
        let origin = Position::new(0.0, 0.0);
        assert_eq!(optimal_handles(origin, Position::new(500.0, 10.0)).source, "right-source");
        assert_eq!(optimal_handles(origin, Position::new(-500.0, 10.0)).target, "right-target");
        assert_eq!(optimal_handles(origin, Position::new(10.0, 500.0)).source, "bottom-source");
        assert_eq!(optimal_handles(origin, Position::new(10.0, -500.0)).target, "bottom-target");
        // Tie goes horizontal.
        assert_eq!(optimal_handles(origin, Position::new(100.0, 100.0)).source, "right-source");
    }

    #[test]
    fn test_edge_ids_and_handles_on_load() {
        let mut dialog = PersistedDialog::new("d1", "Intro", None);
        let choice = Choice {
            id: "c1".to_string(),
            content: "Go".to_string(),
            next_node: Some(NodeId::from("b")),
        };
        dialog.nodes.insert(
            NodeId::from("a"),
            PersistedNode {
                id: NodeId::from("a"),
                pos_x: 0,
                pos_y: 0,
                data: PersistedNodeData::Choices(ChoiceSet { choices: vec![choice] }),
            },
        );
        dialog.nodes.insert(
            NodeId::from("b"),
            PersistedNode {
                id: NodeId::from("b"),
                pos_x: 0,
                pos_y: 600,
                data: PersistedNodeData::Dialog(PersistedDialogLine {
                    next_node: Some(NodeId::from("a")),
                    ..Default::default()
                }),
            },
        );

        let (_, graph) = from_persisted(&dialog);
        let by_id: BTreeMap<&str, &Edge> = graph.edges().iter().map(|e| (e.id.as_str(), e)).collect();

        let choice_edge = by_id["a-choice-c1-b"];
        assert_eq!(choice_edge.source_handle.as_deref(), Some("choice-c1"));
        assert_eq!(choice_edge.target_handle.as_deref(), Some("top-target"));

        let back_edge = by_id["b-a"];
        assert_eq!(back_edge.source_handle.as_deref(), Some("top-source"));
        assert_eq!(back_edge.target_handle.as_deref(), Some("bottom-target"));
    }

    #[test]
    fn test_dangling_links_are_dropped() {
        let mut dialog = PersistedDialog::new("d1", "Intro", None);
        dialog.root_node = Some(NodeId::from("ghost"));
        dialog.nodes.insert(
            NodeId::from("a"),
            PersistedNode {
                id: NodeId::from("a"),
                pos_x: 0,
                pos_y: 0,
                data: PersistedNodeData::Dialog(PersistedDialogLine {
                    next_node: Some(NodeId::from("ghost")),
                    ..Default::default()
                }),
            },
        );

        let (_, graph) = from_persisted(&dialog);
        assert_eq!(graph.num_edges(), 0);
        assert_eq!(graph.root(), None);

        let saved = to_persisted(&graph, &header());
        match &saved.nodes[&NodeId::from("a")].data {
            PersistedNodeData::Dialog(line) => assert_eq!(line.next_node, None),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_positions_are_rounded() {
        let mut graph = DialogGraph::new();
        let id = graph.create_node(NodeKind::Dialog, Position::new(10.6, -0.4));
        let saved = to_persisted(&graph, &header());
        let node = &saved.nodes[&id];
        assert_eq!((node.pos_x, node.pos_y), (11, 0));
    }

    #[test]
    fn test_phylum_without_default_gets_one() {
        let mut dialog = PersistedDialog::new("d1", "Intro", None);
        dialog.nodes.insert(
            NodeId::from("p"),
            PersistedNode {
                id: NodeId::from("p"),
                pos_x: 0,
                pos_y: 0,
                data: PersistedNodeData::Phylum(Phylum {
                    name: "gate".to_string(),
                    branches: vec![Condition::new("only", 1, None)],
                }),
            },
        );

        let (_, graph) = from_persisted(&dialog);
        let phylum = graph.node(&NodeId::from("p")).unwrap().as_phylum().unwrap();
        assert_eq!(phylum.branches.len(), 2);
        assert!(phylum.branches[1].is_default());
    }

    #[test]
    fn test_conditioned_or_duplicate_default_is_repaired() {
        let mut dialog = PersistedDialog::new("d1", "Intro", None);
        let mut guarded = Condition::new(DEFAULT_BRANCH_NAME, 5, Some(NecessityExpression::var("ghost", "on")));
        guarded.next_node = Some(NodeId::from("a"));
        let mut second = Condition::fallback();
        second.next_node = Some(NodeId::from("b"));
        for node in ["a", "b"] {
            dialog.nodes.insert(
                NodeId::from(node),
                PersistedNode {
                    id: NodeId::from(node),
                    pos_x: 0,
                    pos_y: 0,
                    data: PersistedNodeData::Dialog(PersistedDialogLine::default()),
                },
            );
        }
        dialog.nodes.insert(
            NodeId::from("p"),
            PersistedNode {
                id: NodeId::from("p"),
                pos_x: 0,
                pos_y: 0,
                data: PersistedNodeData::Phylum(Phylum {
                    name: "gate".to_string(),
                    branches: vec![guarded, second],
                }),
            },
        );

        let (_, graph) = from_persisted(&dialog);
        let phylum = graph.node(&NodeId::from("p")).unwrap().as_phylum().unwrap();
        let defaults: Vec<_> = phylum.branches.iter().filter(|b| b.is_default()).collect();
        assert_eq!(defaults.len(), 1);
        assert!(defaults[0].necessities.is_none());
        assert_eq!(defaults[0].next_node, Some(NodeId::from("a")));
        assert_eq!(phylum.branches[1].name, "default-2");
        assert_eq!(phylum.branches[1].next_node, Some(NodeId::from("b")));
        assert_eq!(graph.edges().len(), 2);
    }

    /// (kind, x, y) per node, then (source, target, slot) connections.
    fn graph_strategy() -> impl Strategy<Value = DialogGraph> {
        let nodes = prop::collection::vec((0u8..3, -2000i32..2000, -2000i32..2000), 1..8);
        nodes
            .prop_flat_map(|nodes| {
                let n = nodes.len();
                let links = prop::collection::vec((0..n, 0..n, 0usize..2), 0..16);
                (Just(nodes), links, 0..n)
            })
            .prop_map(|(layout, links, root)| {
                let mut graph = DialogGraph::new();
                let ids: Vec<NodeId> = layout
                    .iter()
                    .map(|(kind, x, y)| {
                        let kind = match kind {
                            0 => NodeKind::Dialog,
                            1 => NodeKind::Choice,
                            _ => NodeKind::Phylum,
                        };
                        let id = graph.create_node(kind, Position::new(f64::from(*x), f64::from(*y)));
                        match kind {
                            NodeKind::Choice => {
                                graph.add_choice(&id, "left").unwrap();
                                graph.add_choice(&id, "right").unwrap();
                            }
                            NodeKind::Phylum => {
                                graph
                                    .add_branch(&id, "gated", 5, Some(crate::types::NecessityExpression::var("v", "on")))
                                    .unwrap();
                            }
                            NodeKind::Dialog => {}
                        }
                        id
                    })
                    .collect();

                for (source, target, slot) in links {
                    let source_id = &ids[source];
                    let handle = match &graph.node(source_id).unwrap().data {
                        NodeData::Dialog(_) => None,
                        NodeData::Choices(set) => Some(Handle::choice(set.choices[slot].id.clone()).to_string()),
                        NodeData::Phylum(phylum) => Some(Handle::branch(phylum.branches[slot].id.clone()).to_string()),
                    };
                    graph.connect(source_id, &ids[target], handle).unwrap();
                }
                graph.set_root(&ids[root]).unwrap();
                graph
            })
    }

    proptest! {
        #[test]
        fn prop_round_trip_preserves_graph(graph in graph_strategy()) {
            let saved = to_persisted(&graph, &header());
            let (loaded_header, loaded) = from_persisted(&saved);

            prop_assert_eq!(loaded_header.id.as_str(), "d1");
            prop_assert_eq!(loaded.root(), graph.root());
            prop_assert_eq!(loaded.nodes().collect::<Vec<_>>(), graph.nodes().collect::<Vec<_>>());
            prop_assert_eq!(logical_edges(&loaded), logical_edges(&graph));

            // Saving again is a fixed point.
            prop_assert_eq!(to_persisted(&loaded, &loaded_header), saved);
        }
    }
}
