// src/resolver/conflict.rs

//! Nearest-wins conflict resolution
//!
//! Runs as a second pass over a fully collected graph. Nodes are grouped by
//! conflict key; in each group the node with the smallest depth wins and
//! ties go to the node discovered first.

use super::graph::{DependencyGraph, NodeId};
use crate::coordinate::{ConflictKey, Coordinate};
use crate::events::{EventReporter, ResolutionEvent};
use indexmap::IndexMap;
use tracing::debug;

/// A node that lost to another version of the same artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub loser: Coordinate,
    pub winner: Coordinate,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} omitted for conflict with {}", self.loser, self.winner)
    }
}

/// Mark every losing node with its winner
///
/// Returns the version conflicts found, in discovery order of the losers.
/// Duplicate occurrences of the winning coordinate itself are marked but
/// not reported.
pub fn resolve_conflicts(graph: &mut DependencyGraph, events: &EventReporter) -> Vec<Conflict> {
    let mut groups: IndexMap<ConflictKey, Vec<NodeId>> = IndexMap::new();
    for node in graph.nodes() {
        groups.entry(node.coordinate.conflict_key()).or_default().push(node.id);
    }

    let mut losers = Vec::new();
    for ids in groups.values() {
        let Some(&winner) = ids.iter().min_by_key(|&&id| (graph.node(id).depth, id)) else {
            continue;
        };
        losers.extend(ids.iter().filter(|&&id| id != winner).map(|&id| (id, winner)));
    }
    losers.sort_unstable();

    let mut conflicts = Vec::new();
    for (id, winner) in losers {
        graph.node_mut(id).winner = Some(winner);

        let loser = &graph.node(id).coordinate;
        let winning = &graph.node(winner).coordinate;
        if loser == winning {
            continue;
        }
        debug!("{} loses to {}", loser, winning);
        events.emit(ResolutionEvent::ConflictResolved {
            loser: loser.clone(),
            winner: winning.clone(),
        });
        conflicts.push(Conflict {
            loser: loser.clone(),
            winner: winning.clone(),
        });
    }
    conflicts
}
