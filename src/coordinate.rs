// src/coordinate.rs

//! Artifact coordinates, exclusions and dependency scopes
//!
//! A [`Coordinate`] names one artifact in a repository:
//! `group:name:version:kind[:classifier]`. Coordinates are immutable; the
//! `with_*` methods consume the value and return a new one.
//!
//! # Identity
//!
//! Equality and hashing cover group, name, version, kind and classifier.
//! Exclusions are carried along for traversal but never affect identity, so
//! the same artifact requested with different exclusion sets is still one
//! map key.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;
use strum_macros::{Display, EnumString};

/// Version suffix marking a mutable (snapshot) version
pub const SNAPSHOT: &str = "SNAPSHOT";

static TIMESTAMPED_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)-(\d{8}\.\d{6})-(\d+)$").unwrap());

/// Identity of a single artifact
#[derive(Debug, Clone)]
pub struct Coordinate {
    group: String,
    name: String,
    version: String,
    kind: String,
    classifier: Option<String>,
    exclusions: Vec<Exclusion>,
}

impl Coordinate {
    /// Create a coordinate, validating every segment
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Result<Self> {
        let coord = Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
            kind: kind.into(),
            classifier: None,
            exclusions: Vec::new(),
        };

        validate_segment("group", &coord.group)?;
        validate_segment("name", &coord.name)?;
        validate_segment("version", &coord.version)?;
        validate_segment("kind", &coord.kind)?;

        Ok(coord)
    }

    /// Return a copy with the given classifier (empty means the default classifier)
    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Result<Self> {
        let classifier = classifier.into();
        if classifier.is_empty() {
            self.classifier = None;
        } else {
            validate_segment("classifier", &classifier)?;
            self.classifier = Some(classifier);
        }
        Ok(self)
    }

    /// Return a copy carrying the given exclusion patterns
    pub fn with_exclusions(mut self, exclusions: impl IntoIterator<Item = Exclusion>) -> Self {
        self.exclusions = exclusions.into_iter().collect();
        self
    }

    /// Return a copy with a different version (used when a descriptor pins one)
    pub fn with_version(&self, version: impl Into<String>) -> Result<Self> {
        let version = version.into();
        validate_segment("version", &version)?;
        Ok(Self {
            version,
            ..self.clone()
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    pub fn exclusions(&self) -> &[Exclusion] {
        &self.exclusions
    }

    /// The descriptor (POM) coordinate for this artifact
    pub fn descriptor(&self) -> Self {
        Self {
            group: self.group.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            kind: "pom".to_string(),
            classifier: None,
            exclusions: Vec::new(),
        }
    }

    /// File extension for this artifact's kind
    pub fn extension(&self) -> &str {
        match self.kind.as_str() {
            "jar" | "bundle" | "maven-plugin" | "ejb" | "ejb-client" | "test-jar"
            | "java-source" | "javadoc" => "jar",
            other => other,
        }
    }

    /// Classifier used in file names, including the one implied by the kind
    pub fn file_classifier(&self) -> Option<&str> {
        if let Some(classifier) = self.classifier.as_deref() {
            return Some(classifier);
        }
        match self.kind.as_str() {
            "test-jar" => Some("tests"),
            "java-source" => Some("sources"),
            "javadoc" => Some("javadoc"),
            "ejb-client" => Some("client"),
            _ => None,
        }
    }

    /// Whether the version may change content over time
    pub fn is_snapshot(&self) -> bool {
        self.version.ends_with(SNAPSHOT)
    }

    /// Version used for the repository directory
    ///
    /// Timestamped snapshot versions (`1.0-20240101.120000-3`) live under
    /// their `-SNAPSHOT` base version.
    pub fn base_version(&self) -> String {
        match TIMESTAMPED_VERSION.captures(&self.version) {
            Some(caps) => format!("{}-{}", &caps[1], SNAPSHOT),
            None => self.version.clone(),
        }
    }

    /// File name of this artifact for a given (possibly timestamped) version
    pub fn file_name_for(&self, version: &str) -> String {
        match self.file_classifier() {
            Some(classifier) => {
                format!("{}-{}-{}.{}", self.name, version, classifier, self.extension())
            }
            None => format!("{}-{}.{}", self.name, version, self.extension()),
        }
    }

    /// File name of this artifact in the local repository
    pub fn file_name(&self) -> String {
        self.file_name_for(&self.version)
    }

    /// Repository-relative directory (`org/example/lib/1.0`)
    pub fn directory(&self) -> String {
        format!(
            "{}/{}/{}",
            self.group.replace('.', "/"),
            self.name,
            self.base_version()
        )
    }

    /// Repository-relative path (`org/example/lib/1.0/lib-1.0.jar`)
    pub fn relative_path(&self) -> String {
        format!("{}/{}", self.directory(), self.file_name())
    }

    /// Key under which competing versions are compared
    pub fn conflict_key(&self) -> ConflictKey {
        ConflictKey {
            group: self.group.clone(),
            name: self.name.clone(),
            kind: self.kind.clone(),
            classifier: self.classifier.clone(),
        }
    }

    /// `group:name` of this coordinate, the unit exclusions operate on
    pub fn module(&self) -> String {
        format!("{}:{}", self.group, self.name)
    }
}

fn validate_segment(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidCoordinate(format!("{field} must not be empty")));
    }
    if value == "." || value == ".." || value.contains(['/', '\\', ':']) {
        return Err(Error::InvalidCoordinate(format!(
            "{field} '{value}' contains a reserved character"
        )));
    }
    Ok(())
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group
            && self.name == other.name
            && self.version == other.version
            && self.kind == other.kind
            && self.classifier == other.classifier
    }
}

impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.group.hash(state);
        self.name.hash(state);
        self.version.hash(state);
        self.kind.hash(state);
        self.classifier.hash(state);
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.group, self.name, self.version, self.kind)?;
        if let Some(ref classifier) = self.classifier {
            write!(f, ":{}", classifier)?;
        }
        Ok(())
    }
}

impl FromStr for Coordinate {
    type Err = Error;

    /// Parse `group:name:version[:kind[:classifier]]`; kind defaults to `jar`
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        match parts.as_slice() {
            [group, name, version] => Coordinate::new(*group, *name, *version, "jar"),
            [group, name, version, kind] => Coordinate::new(*group, *name, *version, *kind),
            [group, name, version, kind, classifier] => {
                Coordinate::new(*group, *name, *version, *kind)?.with_classifier(*classifier)
            }
            _ => Err(Error::InvalidCoordinate(format!(
                "'{s}' is not group:name:version[:kind[:classifier]]"
            ))),
        }
    }
}

/// Identity used for conflict resolution: everything but the version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConflictKey {
    pub group: String,
    pub name: String,
    pub kind: String,
    pub classifier: Option<String>,
}

/// A `group:name` pattern suppressing a sub-tree; `*` matches any segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Exclusion {
    pub group: String,
    pub name: String,
}

impl Exclusion {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Whether this pattern excludes the given module
    pub fn matches(&self, group: &str, name: &str) -> bool {
        (self.group == "*" || self.group == group) && (self.name == "*" || self.name == name)
    }

    /// Parse a comma-separated list of `group:name` patterns
    pub fn parse_list(list: &str) -> Result<Vec<Exclusion>> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.parse())
            .collect()
    }
}

impl FromStr for Exclusion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split(':').collect::<Vec<_>>().as_slice() {
            [group, name] if !group.is_empty() && !name.is_empty() => {
                Ok(Exclusion::new(*group, *name))
            }
            _ => Err(Error::InvalidCoordinate(format!(
                "Illegal exclusion coordinates '{s}', expected group:name"
            ))),
        }
    }
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

/// Dependency scope as declared in a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Scope {
    #[default]
    Compile,
    Runtime,
    Provided,
    Test,
    System,
    Import,
}

impl Scope {
    /// Whether edges of this scope are followed below the roots
    pub fn is_transitive(&self) -> bool {
        matches!(self, Scope::Compile | Scope::Runtime)
    }
}

/// A directed edge from a parent coordinate to a child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// `None` for edges leaving the synthetic super-root
    pub parent: Option<Coordinate>,
    pub child: Coordinate,
    pub scope: Scope,
    pub optional: bool,
    /// Exclusions accumulated along the path, applied to the child's descendants
    pub exclusions: Vec<Exclusion>,
}

impl DependencyEdge {
    /// Edge from the super-root to a requested coordinate
    pub fn root(child: Coordinate) -> Self {
        let exclusions = child.exclusions().to_vec();
        Self {
            parent: None,
            child,
            scope: Scope::Runtime,
            optional: false,
            exclusions,
        }
    }

    /// Whether any inherited pattern excludes the given coordinate
    pub fn excludes(&self, coord: &Coordinate) -> bool {
        self.exclusions
            .iter()
            .any(|exclusion| exclusion.matches(coord.group(), coord.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_display_and_parse() {
        let coord: Coordinate = "org.ow2.asm:asm:5.0.1".parse().unwrap();
        assert_eq!(coord.kind(), "jar");
        assert_eq!(coord.to_string(), "org.ow2.asm:asm:5.0.1:jar");

        let classified: Coordinate = "org.example:lib:1.0:jar:sources".parse().unwrap();
        assert_eq!(classified.classifier(), Some("sources"));
        assert_eq!(classified.to_string(), "org.example:lib:1.0:jar:sources");

        assert!("org.example:lib".parse::<Coordinate>().is_err());
        assert!("org.example::1.0".parse::<Coordinate>().is_err());
    }

    #[test]
    fn test_rejects_path_segments() {
        assert!(Coordinate::new("org.example", "../etc", "1.0", "jar").is_err());
        assert!(Coordinate::new("org.example", "lib", "..", "jar").is_err());
        assert!(Coordinate::new("org/example", "lib", "1.0", "jar").is_err());
        assert!(Coordinate::new("", "lib", "1.0", "jar").is_err());
    }

    #[test]
    fn test_identity_ignores_exclusions() {
        let plain = Coordinate::new("g", "a", "1.0", "jar").unwrap();
        let excluded = plain
            .clone()
            .with_exclusions(vec![Exclusion::new("x", "y")]);
        let classified = plain.clone().with_classifier("sources").unwrap();

        assert_eq!(plain, excluded);
        assert_ne!(plain, classified);

        let mut set = HashSet::new();
        set.insert(plain);
        assert!(set.contains(&excluded));
        assert!(!set.contains(&classified));
    }

    #[test]
    fn test_repository_layout() {
        let coord = Coordinate::new("org.example.core", "lib", "1.2", "jar").unwrap();
        assert_eq!(coord.relative_path(), "org/example/core/lib/1.2/lib-1.2.jar");

        let tests = Coordinate::new("org.example", "lib", "1.2", "test-jar").unwrap();
        assert_eq!(tests.relative_path(), "org/example/lib/1.2/lib-1.2-tests.jar");

        let pom = coord.descriptor();
        assert_eq!(pom.relative_path(), "org/example/core/lib/1.2/lib-1.2.pom");
    }

    #[test]
    fn test_snapshot_versions() {
        let snapshot = Coordinate::new("g", "a", "1.0-SNAPSHOT", "jar").unwrap();
        assert!(snapshot.is_snapshot());
        assert_eq!(snapshot.base_version(), "1.0-SNAPSHOT");

        let timestamped = Coordinate::new("g", "a", "1.0-20240101.120000-3", "jar").unwrap();
        assert!(!timestamped.is_snapshot());
        assert_eq!(timestamped.base_version(), "1.0-SNAPSHOT");
        assert_eq!(
            timestamped.relative_path(),
            "g/a/1.0-SNAPSHOT/a-1.0-20240101.120000-3.jar"
        );
    }

    #[test]
    fn test_exclusion_patterns() {
        let exact = Exclusion::new("g", "a");
        assert!(exact.matches("g", "a"));
        assert!(!exact.matches("g", "b"));

        let any_name = Exclusion::new("g", "*");
        assert!(any_name.matches("g", "anything"));
        assert!(!any_name.matches("h", "anything"));

        let list = Exclusion::parse_list("g:a, h:*").unwrap();
        assert_eq!(list, vec![exact, Exclusion::new("h", "*")]);

        assert!(Exclusion::parse_list("g:a:b").is_err());
        assert!(Exclusion::parse_list("justone").is_err());
    }

    #[test]
    fn test_scope() {
        assert_eq!("runtime".parse::<Scope>().unwrap(), Scope::Runtime);
        assert_eq!("TEST".parse::<Scope>().unwrap(), Scope::Test);
        assert!(Scope::Compile.is_transitive());
        assert!(!Scope::Provided.is_transitive());
        assert!(!Scope::Test.is_transitive());
    }

    #[test]
    fn test_root_edge_carries_exclusions() {
        let root = Coordinate::new("g", "r", "1", "jar")
            .unwrap()
            .with_exclusions(vec![Exclusion::new("g", "a")]);
        let edge = DependencyEdge::root(root);
        let excluded = Coordinate::new("g", "a", "1.0", "jar").unwrap();
        let kept = Coordinate::new("g", "b", "1.0", "jar").unwrap();
        assert!(edge.excludes(&excluded));
        assert!(!edge.excludes(&kept));
    }
}
