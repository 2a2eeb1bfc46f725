// src/metadata/mod.rs

//! Descriptor resolution
//!
//! The [`MetadataResolver`] turns a coordinate into its effective
//! [`Descriptor`]: the descriptor is fetched cache-first through the
//! [`ArtifactFetcher`], parsed, and completed with its parent chain,
//! property interpolation, dependency management and imported BOMs.
//!
//! A resolver lives for one resolution run. Raw and effective descriptors
//! are memoised for that run only.

pub mod model;
pub mod pom;
pub mod xml;

pub use model::{Dependency, Descriptor};
pub use pom::{RawDependency, RawPom};

use crate::coordinate::{Coordinate, DependencyEdge};
use crate::error::{Error, Result};
use crate::repository::{ArtifactFetcher, FetchPurpose};
use dashmap::DashMap;
use indexmap::IndexMap;
use model::Properties;
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Longest parent chain accepted
pub const MAX_PARENT_DEPTH: usize = 16;

/// Resolves effective descriptors for one resolution run
pub struct MetadataResolver {
    fetcher: Arc<ArtifactFetcher>,
    raw: DashMap<Coordinate, Arc<RawPom>>,
    effective: DashMap<Coordinate, Arc<Descriptor>>,
}

impl MetadataResolver {
    pub fn new(fetcher: Arc<ArtifactFetcher>) -> Self {
        Self {
            fetcher,
            raw: DashMap::new(),
            effective: DashMap::new(),
        }
    }

    /// Effective descriptor of a coordinate
    ///
    /// Fails with `MetadataUnavailable` when no repository (or, offline, the
    /// cache) has the descriptor and `MetadataCorrupt` when it cannot be
    /// parsed. Cancellation is passed through.
    pub fn descriptor(&self, coord: &Coordinate, cancel: &CancellationToken) -> Result<Arc<Descriptor>> {
        self.descriptor_guarded(&coord.descriptor(), cancel, &mut Vec::new())
    }

    /// Child edges of a node, in declaration order
    ///
    /// Every declared dependency is returned; the caller decides which
    /// scopes and optional edges to follow.
    pub fn edges(&self, edge: &DependencyEdge, cancel: &CancellationToken) -> Result<Vec<DependencyEdge>> {
        let descriptor = self.descriptor(&edge.child, cancel)?;
        Ok(descriptor
            .dependencies
            .iter()
            .map(|dependency| dependency.edge_from(edge))
            .collect())
    }

    fn descriptor_guarded(
        &self,
        pom: &Coordinate,
        cancel: &CancellationToken,
        importing: &mut Vec<Coordinate>,
    ) -> Result<Arc<Descriptor>> {
        if let Some(cached) = self.effective.get(pom) {
            return Ok(cached.clone());
        }

        let chain = self.parent_chain(pom, cancel)?;
        let own = &chain[0];

        let group = own
            .group
            .clone()
            .or_else(|| own.parent.as_ref().map(|p| p.group.clone()))
            .unwrap_or_else(|| pom.group().to_string());
        let version = own
            .version
            .clone()
            .or_else(|| own.parent.as_ref().map(|p| p.version.clone()))
            .unwrap_or_else(|| pom.version().to_string());
        let props = Properties::for_chain(&chain, &group, &version);

        let mut management: IndexMap<String, RawDependency> = IndexMap::new();
        for raw in chain.iter().flat_map(|p| p.dependency_management.iter()) {
            let dep = props.interpolate_dependency(raw);
            management.entry(dep.management_key()).or_insert(dep);
        }

        importing.push(pom.clone());
        let imports: Vec<RawDependency> = management
            .values()
            .filter(|d| d.scope.as_deref() == Some("import") && d.kind.as_deref() == Some("pom"))
            .cloned()
            .collect();
        for bom in imports {
            self.import_bom(pom, &bom, &mut management, cancel, importing)?;
        }
        importing.pop();

        let mut declared: IndexMap<String, RawDependency> = IndexMap::new();
        for raw in chain.iter().rev().flat_map(|p| p.dependencies.iter()) {
            let dep = props.interpolate_dependency(raw);
            declared.insert(dep.management_key(), dep);
        }

        let dependencies = declared
            .values()
            .filter_map(|raw| model::manage(pom, raw, &management))
            .collect();

        let descriptor = Arc::new(Descriptor {
            coordinate: pom.clone(),
            packaging: own.packaging.clone().unwrap_or_else(|| "jar".to_string()),
            dependencies,
            management,
        });
        self.effective.insert(pom.clone(), descriptor.clone());
        Ok(descriptor)
    }

    fn import_bom(
        &self,
        owner: &Coordinate,
        bom: &RawDependency,
        management: &mut IndexMap<String, RawDependency>,
        cancel: &CancellationToken,
        importing: &mut Vec<Coordinate>,
    ) -> Result<()> {
        let Some(version) = bom.version.as_deref().filter(|v| !model::is_unresolved(v)) else {
            warn!("Skipping import of {}:{} in {}: no version", bom.group, bom.name, owner);
            return Ok(());
        };
        let bom_coord = match Coordinate::new(bom.group.clone(), bom.name.clone(), version, "pom") {
            Ok(coord) => coord,
            Err(e) => {
                warn!("Skipping import in {}: {}", owner, e);
                return Ok(());
            }
        };
        if importing.contains(&bom_coord) {
            warn!("Import cycle through {} in {}", bom_coord, owner);
            return Ok(());
        }

        match self.descriptor_guarded(&bom_coord, cancel, importing) {
            Ok(imported) => {
                debug!("Importing management of {} into {}", bom_coord, owner);
                for (key, dep) in &imported.management {
                    management.entry(key.clone()).or_insert_with(|| dep.clone());
                }
                Ok(())
            }
            Err(e) if e.is_cancellation() => Err(e),
            Err(e) => {
                warn!("Could not import {} into {}: {}", bom_coord, owner, e);
                Ok(())
            }
        }
    }

    /// The descriptor followed by its ancestors
    fn parent_chain(&self, pom: &Coordinate, cancel: &CancellationToken) -> Result<Vec<RawPom>> {
        let own = self.raw_descriptor(pom, cancel)?;
        let mut chain = vec![(*own).clone()];
        let mut seen = HashSet::from([pom.clone()]);

        while let Some(parent) = chain.last().and_then(|p| p.parent.clone()) {
            if chain.len() > MAX_PARENT_DEPTH {
                return Err(Error::metadata_corrupt(
                    pom,
                    format!("parent chain deeper than {MAX_PARENT_DEPTH}"),
                ));
            }
            let parent_coord = Coordinate::new(parent.group, parent.name, parent.version, "pom")
                .map_err(|e| Error::metadata_corrupt(pom, e.to_string()))?;
            if !seen.insert(parent_coord.clone()) {
                return Err(Error::metadata_corrupt(
                    pom,
                    format!("parent cycle through {parent_coord}"),
                ));
            }

            let raw = self.raw_descriptor(&parent_coord, cancel).map_err(|e| match e {
                Error::MetadataUnavailable { reason, .. } => Error::metadata_unavailable(
                    pom,
                    format!("parent {parent_coord} unavailable: {reason}"),
                ),
                Error::MetadataCorrupt { reason, .. } => {
                    Error::metadata_corrupt(pom, format!("parent {parent_coord}: {reason}"))
                }
                other => other,
            })?;
            chain.push((*raw).clone());
        }

        Ok(chain)
    }

    /// Fetch and parse one descriptor
    fn raw_descriptor(&self, pom: &Coordinate, cancel: &CancellationToken) -> Result<Arc<RawPom>> {
        if let Some(cached) = self.raw.get(pom) {
            return Ok(cached.clone());
        }

        let path = self
            .fetcher
            .fetch(pom, FetchPurpose::Descriptor, cancel)
            .map_err(|e| match e {
                Error::Cancelled | Error::LockFailed { .. } => e,
                Error::OfflineViolation { .. } => {
                    Error::metadata_unavailable(pom, "offline and not in the local repository")
                }
                other => Error::metadata_unavailable(pom, other.to_string()),
            })?;

        let content = fs::read_to_string(&path).map_err(|e| Error::metadata_corrupt(pom, e.to_string()))?;
        let raw = RawPom::parse(&content).map_err(|e| Error::metadata_corrupt(pom, e.to_string()))?;
        let raw = Arc::new(raw);
        self.raw.insert(pom.clone(), raw.clone());
        Ok(raw)
    }
}
