// src/metadata/model.rs

//! Effective descriptor model
//!
//! The effective model is what resolution consumes: coordinates fully
//! interpolated, parent content inherited, managed versions and scopes
//! applied.

use super::pom::{RawDependency, RawPom};
use crate::coordinate::{Coordinate, DependencyEdge, Exclusion, Scope};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

/// Passes of `${...}` substitution before giving up on nested expressions
const MAX_INTERPOLATION_PASSES: usize = 10;

static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// A declared dependency after interpolation and management
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub coordinate: Coordinate,
    pub scope: Scope,
    pub optional: bool,
    pub exclusions: Vec<Exclusion>,
}

impl Dependency {
    /// Edge from `parent` to this dependency
    ///
    /// Exclusions accumulate along the path. A compile dependency reached
    /// through a runtime edge becomes runtime.
    pub fn edge_from(&self, parent: &DependencyEdge) -> DependencyEdge {
        let scope = match (parent.scope, self.scope) {
            (Scope::Runtime, Scope::Compile) => Scope::Runtime,
            (_, scope) => scope,
        };
        let mut exclusions = parent.exclusions.clone();
        for exclusion in &self.exclusions {
            if !exclusions.contains(exclusion) {
                exclusions.push(exclusion.clone());
            }
        }
        DependencyEdge {
            parent: Some(parent.child.clone()),
            child: self.coordinate.clone().with_exclusions(self.exclusions.clone()),
            scope,
            optional: self.optional,
            exclusions,
        }
    }
}

/// Effective descriptor of one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub coordinate: Coordinate,
    pub packaging: String,
    /// Declared dependencies in document order
    pub dependencies: Vec<Dependency>,
    /// Managed dependencies, keyed by group:name:type:classifier
    pub management: IndexMap<String, RawDependency>,
}

/// Property scope for interpolating one descriptor
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: IndexMap<String, String>,
}

impl Properties {
    /// Build properties from a parent chain, nearest descriptor last
    ///
    /// `chain[0]` is the descriptor itself; ancestors follow.
    pub fn for_chain(chain: &[RawPom], group: &str, version: &str) -> Self {
        let mut values = IndexMap::new();
        for pom in chain.iter().rev() {
            for (key, value) in &pom.properties {
                values.insert(key.clone(), value.clone());
            }
        }

        let own = &chain[0];
        let packaging = own.packaging.clone().unwrap_or_else(|| "jar".to_string());
        for prefix in ["project", "pom"] {
            values.insert(format!("{prefix}.groupId"), group.to_string());
            values.insert(format!("{prefix}.artifactId"), own.name.clone());
            values.insert(format!("{prefix}.version"), version.to_string());
            values.insert(format!("{prefix}.packaging"), packaging.clone());
        }
        if let Some(parent) = &own.parent {
            for prefix in ["parent", "project.parent"] {
                values.insert(format!("{prefix}.groupId"), parent.group.clone());
                values.insert(format!("{prefix}.artifactId"), parent.name.clone());
                values.insert(format!("{prefix}.version"), parent.version.clone());
            }
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Substitute `${...}` expressions; unknown ones are left in place
    pub fn interpolate(&self, input: &str) -> String {
        let mut current = input.to_string();
        for _ in 0..MAX_INTERPOLATION_PASSES {
            if !current.contains("${") {
                break;
            }
            let next = EXPRESSION
                .replace_all(&current, |caps: &regex::Captures| match self.get(&caps[1]) {
                    Some(value) => value.to_string(),
                    None => caps[0].to_string(),
                })
                .into_owned();
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Interpolate every field of a dependency
    pub fn interpolate_dependency(&self, raw: &RawDependency) -> RawDependency {
        let opt = |value: &Option<String>| value.as_deref().map(|v| self.interpolate(v));
        RawDependency {
            group: self.interpolate(&raw.group),
            name: self.interpolate(&raw.name),
            version: opt(&raw.version),
            kind: opt(&raw.kind),
            classifier: opt(&raw.classifier),
            scope: opt(&raw.scope),
            optional: opt(&raw.optional),
            exclusions: raw
                .exclusions
                .iter()
                .map(|e| Exclusion::new(self.interpolate(&e.group), self.interpolate(&e.name)))
                .collect(),
        }
    }
}

/// Whether a value still contains an unresolved expression
pub fn is_unresolved(value: &str) -> bool {
    value.contains("${")
}

/// Apply management to an interpolated dependency and build its final form
///
/// Returns `None` (with a warning) when no usable version can be found.
pub fn manage(
    owner: &Coordinate,
    raw: &RawDependency,
    management: &IndexMap<String, RawDependency>,
) -> Option<Dependency> {
    let managed = management.get(&raw.management_key());

    let version = raw
        .version
        .clone()
        .or_else(|| managed.and_then(|m| m.version.clone()))
        .filter(|v| !v.is_empty() && !is_unresolved(v));
    let Some(version) = version else {
        warn!(
            "Dropping {}:{} declared by {}: no version",
            raw.group, raw.name, owner
        );
        return None;
    };

    let scope = raw
        .scope
        .as_deref()
        .or_else(|| managed.and_then(|m| m.scope.as_deref()))
        .map(|s| s.parse::<Scope>().unwrap_or_default())
        .unwrap_or_default();

    let mut exclusions = raw.exclusions.clone();
    if let Some(managed) = managed {
        for exclusion in &managed.exclusions {
            if !exclusions.contains(exclusion) {
                exclusions.push(exclusion.clone());
            }
        }
    }

    let coordinate = Coordinate::new(
        raw.group.clone(),
        raw.name.clone(),
        version,
        raw.kind.clone().unwrap_or_else(|| "jar".to_string()),
    )
    .and_then(|coord| coord.with_classifier(raw.classifier.clone().unwrap_or_default()));

    match coordinate {
        Ok(coordinate) => Some(Dependency {
            coordinate,
            scope,
            optional: raw
                .optional
                .as_deref()
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            exclusions,
        }),
        Err(e) => {
            warn!("Dropping dependency declared by {}: {}", owner, e);
            None
        }
    }
}
