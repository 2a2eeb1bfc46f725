// src/resolver/graph.rs

//! Dependency graph of one resolution run
//!
//! Nodes are stored in an arena in discovery order and refer to each other
//! by [`NodeId`]. A losing node keeps the id of its winner, a relation
//! rather than ownership, so losers stay available for reporting.

use crate::coordinate::{Coordinate, DependencyEdge};
use crate::error::Failure;

/// Index of a node in its graph
pub type NodeId = usize;

/// A coordinate reached through one path from the roots
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: NodeId,
    pub coordinate: Coordinate,
    /// Distance from the synthetic super-root; roots are at depth 1
    pub depth: usize,
    /// Node that declared this one, `None` for roots
    pub parent: Option<NodeId>,
    /// Edge by which this node was reached
    pub edge: DependencyEdge,
    /// Child edges followed or recorded while expanding this node
    pub children: Vec<DependencyEdge>,
    /// Set when another node won conflict resolution for this key
    pub winner: Option<NodeId>,
    /// Set when this node's descriptor could not be resolved
    pub failure: Option<Failure>,
    /// Whether the coordinate's key already appears on its own ancestor path
    pub cycle: bool,
}

impl GraphNode {
    /// Whether this node won (or never faced) conflict resolution
    pub fn is_winner(&self) -> bool {
        self.winner.is_none()
    }

    pub fn is_unresolved(&self) -> bool {
        self.failure.is_some()
    }

    /// Optional child edges that were recorded but not followed
    pub fn optional_children(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.children.iter().filter(|edge| edge.optional)
    }
}

/// Every node discovered during collection, losers included
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node reached through `edge`
    pub fn add(&mut self, edge: DependencyEdge, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        let depth = parent.map(|p| self.nodes[p].depth + 1).unwrap_or(1);
        let key = edge.child.conflict_key();
        let cycle = self.ancestors(parent).any(|node| node.coordinate.conflict_key() == key);
        self.nodes.push(GraphNode {
            id,
            coordinate: edge.child.clone(),
            depth,
            parent,
            edge,
            children: Vec::new(),
            winner: None,
            failure: None,
            cycle,
        });
        id
    }

    /// Nodes from `start` up to its root
    pub fn ancestors(&self, start: Option<NodeId>) -> impl Iterator<Item = &GraphNode> {
        std::iter::successors(start.map(|id| &self.nodes[id]), |node| {
            node.parent.map(|id| &self.nodes[id])
        })
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut GraphNode {
        &mut self.nodes[id]
    }

    /// All nodes in discovery order
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes that lost conflict resolution
    pub fn losers(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|node| !node.is_winner())
    }

    /// Winning node of a loser (the node itself when it won)
    pub fn winner_of(&self, id: NodeId) -> &GraphNode {
        match self.nodes[id].winner {
            Some(winner) => &self.nodes[winner],
            None => &self.nodes[id],
        }
    }

    /// Nodes whose key reappears on their own ancestor path
    pub fn cycles(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|node| node.cycle)
    }

    /// Path from the first root to a node, as coordinates
    pub fn path_to(&self, id: NodeId) -> Vec<&Coordinate> {
        let mut path: Vec<&Coordinate> = self.ancestors(Some(id)).map(|node| &node.coordinate).collect();
        path.reverse();
        path
    }
}
