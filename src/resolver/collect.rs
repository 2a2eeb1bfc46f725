// src/resolver/collect.rs

//! Breadth-first graph collection
//!
//! Descriptors of one traversal level are fetched in parallel; a node's
//! children are only created once its own descriptor is known.
//!
//! The first node discovered for a conflict key is the nearest one, so it is
//! also the one that wins; other versions of that key are never expanded.
//! Further occurrences of the winning coordinate are expanded again when
//! they are reached under exclusions that hide less than every expansion so
//! far, so a dependency excluded on one path still arrives through another.

use super::graph::{DependencyGraph, GraphNode, NodeId};
use crate::coordinate::{ConflictKey, Coordinate, DependencyEdge, Exclusion};
use crate::error::{Error, Failure, Result};
use crate::metadata::MetadataResolver;
use rayon::ThreadPool;
use rayon::prelude::*;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Walks declared dependencies from the roots and records every node reached
pub struct GraphCollector<'a> {
    metadata: &'a MetadataResolver,
    pool: &'a ThreadPool,
}

impl<'a> GraphCollector<'a> {
    pub fn new(metadata: &'a MetadataResolver, pool: &'a ThreadPool) -> Self {
        Self { metadata, pool }
    }

    /// Collect the graph reachable from `roots`
    ///
    /// Descriptor failures are recorded on their node and traversal goes on;
    /// only cancellation aborts.
    pub fn collect(&self, roots: &[Coordinate], cancel: &CancellationToken) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        let mut expanded = Expansions::default();
        let mut frontier = Vec::new();

        for root in roots {
            let id = graph.add(DependencyEdge::root(root.clone()), None);
            if expanded.admit(graph.node(id)) {
                frontier.push(id);
            }
        }

        while !frontier.is_empty() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let work: Vec<(NodeId, DependencyEdge)> = frontier
                .iter()
                .map(|&id| (id, graph.node(id).edge.clone()))
                .collect();
            let metadata = self.metadata;
            let discovered: Vec<(NodeId, Result<Vec<DependencyEdge>>)> = self.pool.install(|| {
                work.into_par_iter()
                    .map(|(id, edge)| (id, metadata.edges(&edge, cancel)))
                    .collect()
            });

            let mut next = Vec::new();
            for (parent, edges) in discovered {
                let edges = match edges {
                    Ok(edges) => edges,
                    Err(e) if e.is_cancellation() => return Err(e),
                    Err(e) => {
                        debug!("{} is unresolved: {}", graph.node(parent).coordinate, e);
                        graph.node_mut(parent).failure = Some(Failure::from(&e));
                        continue;
                    }
                };

                for edge in edges {
                    if let Some(id) = self.visit(&mut graph, parent, edge)
                        && expanded.admit(graph.node(id))
                    {
                        next.push(id);
                    }
                }
            }
            frontier = next;
        }

        Ok(graph)
    }

    /// Record one child edge of `parent`, returning the node it created
    fn visit(&self, graph: &mut DependencyGraph, parent: NodeId, edge: DependencyEdge) -> Option<NodeId> {
        if !edge.scope.is_transitive() {
            return None;
        }
        if graph.node(parent).edge.excludes(&edge.child) {
            debug!(
                "{} excluded below {}",
                edge.child,
                graph.node(parent).coordinate
            );
            return None;
        }

        graph.node_mut(parent).children.push(edge.clone());
        if edge.optional {
            return None;
        }

        let id = graph.add(edge, Some(parent));
        if graph.node(id).cycle {
            debug!(
                "Cycle: {} already on the path {}",
                graph.node(id).coordinate,
                graph
                    .path_to(parent)
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            );
        }
        Some(id)
    }
}

/// Exclusion contexts under which each winning coordinate was expanded
#[derive(Default)]
struct Expansions {
    by_key: HashMap<ConflictKey, (Coordinate, Vec<Vec<Exclusion>>)>,
}

impl Expansions {
    /// Whether `node` should be expanded, recording its context if so
    ///
    /// Cycle nodes and other versions of an already expanded key are
    /// rejected. A repeat of the winning coordinate is admitted unless some
    /// earlier expansion excluded a subset of what this path excludes.
    fn admit(&mut self, node: &GraphNode) -> bool {
        if node.cycle {
            return false;
        }
        let exclusions = &node.edge.exclusions;
        match self.by_key.get_mut(&node.coordinate.conflict_key()) {
            None => {
                self.by_key.insert(
                    node.coordinate.conflict_key(),
                    (node.coordinate.clone(), vec![exclusions.clone()]),
                );
                true
            }
            Some((winner, _)) if *winner != node.coordinate => false,
            Some((_, contexts)) => {
                let covered = contexts
                    .iter()
                    .any(|earlier| earlier.iter().all(|exclusion| exclusions.contains(exclusion)));
                if covered {
                    return false;
                }
                debug!("Expanding {} again under fewer exclusions", node.coordinate);
                contexts.push(exclusions.clone());
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(child: &str, excluded: &[&str]) -> DependencyEdge {
        DependencyEdge {
            exclusions: excluded.iter().map(|name| Exclusion::new("g", *name)).collect(),
            ..DependencyEdge::root(child.parse().unwrap())
        }
    }

    #[test]
    fn test_repeat_expanded_only_under_fewer_exclusions() {
        let mut graph = DependencyGraph::new();
        let mut expanded = Expansions::default();

        let first = graph.add(edge("g:c:1", &["z"]), None);
        assert!(expanded.admit(graph.node(first)));

        let narrower = graph.add(edge("g:c:1", &["z", "y"]), None);
        assert!(!expanded.admit(graph.node(narrower)));

        let wider = graph.add(edge("g:c:1", &[]), None);
        assert!(expanded.admit(graph.node(wider)));

        let after_wider = graph.add(edge("g:c:1", &["y"]), None);
        assert!(!expanded.admit(graph.node(after_wider)));
    }

    #[test]
    fn test_other_versions_and_cycles_are_not_expanded() {
        let mut graph = DependencyGraph::new();
        let mut expanded = Expansions::default();

        let winner = graph.add(edge("g:c:1", &["z"]), None);
        assert!(expanded.admit(graph.node(winner)));
        let other = graph.add(edge("g:c:2", &[]), None);
        assert!(!expanded.admit(graph.node(other)));

        let parent = graph.add(edge("g:p:1", &[]), None);
        assert!(expanded.admit(graph.node(parent)));
        let cycle = graph.add(edge("g:p:1", &[]), Some(parent));
        assert!(graph.node(cycle).cycle);
        assert!(!expanded.admit(graph.node(cycle)));
    }
}
