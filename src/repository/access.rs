// src/repository/access.rs

//! Effective repository endpoints
//!
//! Applies the mirror, proxy and auth selectors to the configured repository
//! list once per resolver, producing the ordered endpoints every lookup
//! walks. Offline mode is enforced here: no endpoint is handed out while
//! offline.

use super::selector::Selectors;
use crate::config::{RemoteRepository, UpdatePolicy};
use crate::coordinate::Coordinate;
use crate::error::{Error, Result};
use tracing::debug;

/// A repository as it will actually be contacted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Effective repository (the mirror when one applies) with proxy and
    /// credentials resolved
    pub repository: RemoteRepository,
    /// Ids of the configured repositories this endpoint stands for
    pub mirrored: Vec<String>,
}

impl Endpoint {
    pub fn id(&self) -> &str {
        &self.repository.id
    }

    /// Absolute URL of a repository-relative path
    pub fn url_for(&self, relative: &str) -> String {
        format!("{}{}", self.repository.base_url(), relative)
    }
}

/// Ordered endpoints plus the offline switch
#[derive(Debug, Clone)]
pub struct RepositoryAccess {
    endpoints: Vec<Endpoint>,
    offline: bool,
}

impl RepositoryAccess {
    /// Resolve endpoints for the configured repositories
    ///
    /// Mirror substitution happens first; repositories sharing a mirror
    /// collapse into one endpoint at the position of the first. Proxy and
    /// credentials already attached to a repository are kept, otherwise the
    /// selectors fill them in.
    pub fn new(repositories: &[RemoteRepository], selectors: &Selectors, offline: bool) -> Self {
        let mut endpoints: Vec<Endpoint> = Vec::new();

        for repo in repositories {
            let effective = match selectors.mirror.mirror_for(repo) {
                Some(mirror) => mirror,
                None => repo.clone(),
            };

            if let Some(existing) = endpoints.iter_mut().find(|e| e.repository.id == effective.id) {
                existing.mirrored.push(repo.id.clone());
                continue;
            }

            let mut effective = effective;
            if effective.proxy.is_none() {
                effective.proxy = selectors.proxy.proxy_for(&effective);
            }
            if effective.credentials.is_none() {
                effective.credentials = selectors.auth.credentials_for(&effective.id);
            }

            debug!(
                "Endpoint {} ({}) for [{}]{}",
                effective.id,
                effective.url,
                repo.id,
                if effective.proxy.is_some() { " via proxy" } else { "" }
            );
            endpoints.push(Endpoint {
                repository: effective,
                mirrored: vec![repo.id.clone()],
            });
        }

        Self { endpoints, offline }
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// All endpoints regardless of the offline switch
    pub fn all(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Endpoints to contact for a coordinate, in lookup order
    ///
    /// Fails with `OfflineViolation` when offline.
    pub fn endpoints_for(&self, coord: &Coordinate) -> Result<&[Endpoint]> {
        if self.offline {
            return Err(Error::OfflineViolation {
                coordinate: coord.to_string(),
            });
        }
        Ok(&self.endpoints)
    }

    /// Ids of every endpoint, for error messages
    pub fn describe(&self) -> String {
        self.endpoints
            .iter()
            .map(|e| e.id())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Update policy most endpoints use, for cached files of unknown origin
    pub fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::most_frequent(self.endpoints.iter().map(|e| e.repository.policy.update))
    }
}
