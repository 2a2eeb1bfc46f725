// src/resolver/result.rs

//! Outcome of one resolution run

use super::conflict::Conflict;
use super::graph::DependencyGraph;
use crate::coordinate::Coordinate;
use crate::error::Failure;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// What happened to one winning coordinate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// The artifact is in the local repository at this path
    Resolved(PathBuf),
    /// The coordinate was requested or reached but could not be materialized
    Unresolved(Failure),
}

impl ArtifactOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ArtifactOutcome::Resolved(path) => Some(path),
            ArtifactOutcome::Unresolved(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            ArtifactOutcome::Resolved(_) => None,
            ArtifactOutcome::Unresolved(failure) => Some(failure),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ArtifactOutcome::Resolved(_))
    }
}

/// Coordinates mapped to their outcome, in first-discovery order
///
/// A coordinate absent from the map was never reached. One that was reached
/// but failed maps to [`ArtifactOutcome::Unresolved`].
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    artifacts: IndexMap<Coordinate, ArtifactOutcome>,
    graph: DependencyGraph,
    conflicts: Vec<Conflict>,
}

impl ResolutionResult {
    pub(crate) fn new(
        artifacts: IndexMap<Coordinate, ArtifactOutcome>,
        graph: DependencyGraph,
        conflicts: Vec<Conflict>,
    ) -> Self {
        Self {
            artifacts,
            graph,
            conflicts,
        }
    }

    pub fn get(&self, coord: &Coordinate) -> Option<&ArtifactOutcome> {
        self.artifacts.get(coord)
    }

    /// Local path of a resolved coordinate
    pub fn path(&self, coord: &Coordinate) -> Option<&Path> {
        self.get(coord).and_then(ArtifactOutcome::path)
    }

    pub fn contains(&self, coord: &Coordinate) -> bool {
        self.artifacts.contains_key(coord)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Coordinate, &ArtifactOutcome)> {
        self.artifacts.iter()
    }

    pub fn coordinates(&self) -> impl Iterator<Item = &Coordinate> {
        self.artifacts.keys()
    }

    pub fn resolved(&self) -> impl Iterator<Item = (&Coordinate, &Path)> {
        self.artifacts
            .iter()
            .filter_map(|(coord, outcome)| outcome.path().map(|path| (coord, path)))
    }

    pub fn unresolved(&self) -> impl Iterator<Item = (&Coordinate, &Failure)> {
        self.artifacts
            .iter()
            .filter_map(|(coord, outcome)| outcome.failure().map(|failure| (coord, failure)))
    }

    /// Whether every reached coordinate was materialized
    pub fn is_complete(&self) -> bool {
        self.artifacts.values().all(ArtifactOutcome::is_resolved)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Full graph, conflict losers included
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Version conflicts settled by nearest-wins
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }
}

impl<'a> IntoIterator for &'a ResolutionResult {
    type Item = (&'a Coordinate, &'a ArtifactOutcome);
    type IntoIter = indexmap::map::Iter<'a, Coordinate, ArtifactOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn test_resolved_and_unresolved_views() {
        let good: Coordinate = "g:good:1".parse().unwrap();
        let bad: Coordinate = "g:bad:1".parse().unwrap();
        let mut artifacts = IndexMap::new();
        artifacts.insert(good.clone(), ArtifactOutcome::Resolved(PathBuf::from("/repo/good.jar")));
        artifacts.insert(
            bad.clone(),
            ArtifactOutcome::Unresolved(Failure {
                kind: FailureKind::DownloadFailed,
                message: "gone".to_string(),
            }),
        );
        let result = ResolutionResult::new(artifacts, DependencyGraph::new(), Vec::new());

        assert_eq!(result.len(), 2);
        assert!(!result.is_complete());
        assert_eq!(result.path(&good), Some(Path::new("/repo/good.jar")));
        assert_eq!(result.path(&bad), None);
        assert!(result.contains(&bad));
        assert!(!result.contains(&"g:other:1".parse().unwrap()));
        assert_eq!(result.resolved().count(), 1);
        let (coord, failure) = result.unresolved().next().unwrap();
        assert_eq!(coord, &bad);
        assert_eq!(failure.kind, FailureKind::DownloadFailed);
        let order: Vec<&str> = result.coordinates().map(|c| c.name()).collect();
        assert_eq!(order, vec!["good", "bad"]);
    }
}
