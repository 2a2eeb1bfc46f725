// src/metadata/pom.rs

//! Raw descriptor (POM) parsing
//!
//! Reads the parts of a POM that matter for transitive resolution. Values
//! are kept exactly as written, `${...}` expressions included; the
//! effective model is built later once the parent chain is known.

use super::xml::{self, Element};
use crate::coordinate::Exclusion;
use crate::error::{Error, Result};
use indexmap::IndexMap;

/// Reference to a parent descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub group: String,
    pub name: String,
    pub version: String,
}

/// A `<dependency>` element, uninterpolated
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawDependency {
    pub group: String,
    pub name: String,
    pub version: Option<String>,
    pub kind: Option<String>,
    pub classifier: Option<String>,
    pub scope: Option<String>,
    pub optional: Option<String>,
    pub exclusions: Vec<Exclusion>,
}

impl RawDependency {
    /// Management key: group, name, type and classifier
    pub fn management_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.group,
            self.name,
            self.kind.as_deref().unwrap_or("jar"),
            self.classifier.as_deref().unwrap_or("")
        )
    }
}

/// One descriptor as written
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawPom {
    pub group: Option<String>,
    pub name: String,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub parent: Option<ParentRef>,
    pub properties: IndexMap<String, String>,
    pub dependency_management: Vec<RawDependency>,
    pub dependencies: Vec<RawDependency>,
}

impl RawPom {
    /// Parse descriptor XML
    ///
    /// Fails on malformed XML or a missing `artifactId`.
    pub fn parse(content: &str) -> Result<Self> {
        let root = xml::parse(content)?;
        if root.name != "project" {
            return Err(Error::Xml(format!("expected <project>, found <{}>", root.name)));
        }

        let name = root
            .text_at("artifactId")
            .ok_or_else(|| Error::Xml("descriptor has no artifactId".to_string()))?;

        let parent = match root.child("parent") {
            Some(parent) => Some(ParentRef {
                group: required(parent, "groupId", "parent")?,
                name: required(parent, "artifactId", "parent")?,
                version: required(parent, "version", "parent")?,
            }),
            None => None,
        };

        let properties = root
            .child("properties")
            .map(|props| {
                props
                    .children
                    .iter()
                    .map(|p| (p.name.clone(), p.text.trim().to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            group: root.text_at("groupId"),
            name,
            version: root.text_at("version"),
            packaging: root.text_at("packaging"),
            parent,
            properties,
            dependency_management: dependencies_at(&root, "dependencyManagement/dependencies")?,
            dependencies: dependencies_at(&root, "dependencies")?,
        })
    }
}

fn required(element: &Element, field: &str, context: &str) -> Result<String> {
    element
        .text_at(field)
        .ok_or_else(|| Error::Xml(format!("{context} has no {field}")))
}

fn dependencies_at(root: &Element, path: &str) -> Result<Vec<RawDependency>> {
    let Some(list) = root.path(path) else {
        return Ok(Vec::new());
    };
    list.children_named("dependency").map(parse_dependency).collect()
}

fn parse_dependency(element: &Element) -> Result<RawDependency> {
    let exclusions = element
        .child("exclusions")
        .map(|list| {
            list.children_named("exclusion")
                .filter_map(|e| Some(Exclusion::new(e.text_at("groupId")?, e.text_at("artifactId")?)))
                .collect()
        })
        .unwrap_or_default();

    Ok(RawDependency {
        group: required(element, "groupId", "dependency")?,
        name: required(element, "artifactId", "dependency")?,
        version: element.text_at("version"),
        kind: element.text_at("type"),
        classifier: element.text_at("classifier"),
        scope: element.text_at("scope"),
        optional: element.text_at("optional"),
        exclusions,
    })
}
