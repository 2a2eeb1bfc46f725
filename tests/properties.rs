// tests/properties.rs

//! Property tests over random dependency graphs, cycles included.

mod common;

use artifetch::Resolver;
use common::{FixtureRepo, config, coord};
use proptest::prelude::*;
use std::collections::{BTreeSet, VecDeque};
use tempfile::TempDir;

const MAX_NODES: usize = 8;

/// Adjacency lists over nodes `0..n`, self-loops and cycles allowed
fn graphs() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=MAX_NODES).prop_flat_map(|n| prop::collection::vec(prop::collection::vec(0..n, 0..3), n))
}

fn spec(node: usize) -> String {
    format!("g:n{node}:1")
}

fn reachable(graph: &[Vec<usize>], roots: &[usize]) -> BTreeSet<usize> {
    let mut seen: BTreeSet<usize> = roots.iter().copied().collect();
    let mut queue: VecDeque<usize> = roots.iter().copied().collect();
    while let Some(node) = queue.pop_front() {
        for &child in &graph[node] {
            if seen.insert(child) {
                queue.push_back(child);
            }
        }
    }
    seen
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn resolves_exactly_the_reachable_closure(graph in graphs(), extra_root in 0..MAX_NODES) {
        let repo = FixtureRepo::new("fixture");
        for (node, deps) in graph.iter().enumerate() {
            let mut unique: Vec<usize> = deps.clone();
            unique.sort_unstable();
            unique.dedup();
            let deps: Vec<String> = unique.iter().map(|&d| spec(d)).collect();
            let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
            repo.publish(&spec(node), &deps);
        }

        let roots: Vec<usize> = if extra_root < graph.len() { vec![0, extra_root] } else { vec![0] };
        let local = TempDir::new().unwrap();
        let resolver = Resolver::new(config(&local, &[&repo])).unwrap();
        let result = resolver
            .resolve(&roots.iter().map(|&r| coord(&spec(r))).collect::<Vec<_>>())
            .unwrap();

        let expected: BTreeSet<String> = reachable(&graph, &roots).into_iter().map(|n| format!("{}:jar", spec(n))).collect();
        let actual: Vec<String> = result.coordinates().map(|c| c.to_string()).collect();
        let actual_set: BTreeSet<String> = actual.iter().cloned().collect();

        prop_assert_eq!(actual.len(), actual_set.len());
        prop_assert_eq!(actual_set, expected);
        prop_assert!(result.is_complete());
    }
}
