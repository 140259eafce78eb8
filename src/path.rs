//! Path resolution over the dialogue graph.
//!
//! Adjacency is derived from the edge list on demand. Every walk tracks the
//! nodes on its current path, so cycles terminate the branch that closes them.
//!
//! [`longest_path`] explores each child with its own copy of the visited set,
//! which is exponential in the worst case. Dialog graphs have small fan-out,
//! and the result only feeds the preview.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::DialogGraph;
use crate::types::{Edge, GraphNode, NodeId};

/// Node id to neighbour ids, neighbours in edge order.
pub type AdjacencyMap = BTreeMap<NodeId, Vec<NodeId>>;

/// Source to targets, preserving edge order.
pub fn forward_map(edges: &[Edge]) -> AdjacencyMap {
    let mut map = AdjacencyMap::new();
    for edge in edges {
        map.entry(edge.source.clone()).or_default().push(edge.target.clone());
    }
    map
}

/// Target to sources, preserving edge order.
pub fn reverse_map(edges: &[Edge]) -> AdjacencyMap {
    let mut map = AdjacencyMap::new();
    for edge in edges {
        map.entry(edge.target.clone()).or_default().push(edge.source.clone());
    }
    map
}

/// Longest acyclic path starting at `root`.
///
/// Each child is explored independently and the longest subpath is appended.
/// On ties the first child in edge order wins.
pub fn longest_path(root: &NodeId, forward: &AdjacencyMap) -> Vec<NodeId> {
    longest_from(root, &BTreeSet::new(), forward)
}

fn longest_from<'a>(
    current: &'a NodeId,
    visited: &BTreeSet<&'a NodeId>,
    forward: &'a AdjacencyMap,
) -> Vec<NodeId> {
    if visited.contains(current) {
        return Vec::new();
    }
    let mut visited = visited.clone();
    visited.insert(current);

    let mut best = Vec::new();
    for child in forward.get(current).into_iter().flatten() {
        let sub = longest_from(child, &visited, forward);
        if sub.len() > best.len() {
            best = sub;
        }
    }

    let mut path = Vec::with_capacity(best.len() + 1);
    path.push(current.clone());
    path.extend(best);
    path
}

/// Follow the first child of each node until a leaf or a revisit.
pub fn first_path(root: &NodeId, forward: &AdjacencyMap) -> Vec<NodeId> {
    let mut visited = BTreeSet::new();
    let mut path = Vec::new();
    let mut current = Some(root);

    while let Some(node) = current {
        if !visited.insert(node) {
            break;
        }
        path.push(node.clone());
        current = forward.get(node).and_then(|children| children.first());
    }
    path
}

/// First path from `root` to `target` found depth-first, both ends included.
pub fn path_to(root: &NodeId, target: &NodeId, forward: &AdjacencyMap) -> Option<Vec<NodeId>> {
    let mut path = Vec::new();
    if search(root, target, forward, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn search(current: &NodeId, target: &NodeId, forward: &AdjacencyMap, path: &mut Vec<NodeId>) -> bool {
    if path.contains(current) {
        return false;
    }
    path.push(current.clone());
    if current == target {
        return true;
    }
    for child in forward.get(current).into_iter().flatten() {
        if search(child, target, forward, path) {
            return true;
        }
    }
    path.pop();
    false
}

/// The preview feed: nodes along the longest path from the root.
///
/// Empty when the graph has no root.
pub fn feed(graph: &DialogGraph) -> Vec<&GraphNode> {
    let Some(root) = graph.root() else {
        return Vec::new();
    };
    let forward = forward_map(graph.edges());
    longest_path(root, &forward)
        .iter()
        .filter_map(|id| graph.node(id))
        .collect()
}
