// src/repository/fetch.rs

//! Cache-first artifact fetching
//!
//! [`ArtifactFetcher::fetch`] is the single path by which files enter the
//! local repository. Under the coordinate's entry lock it:
//!
//! 1. Returns the cached file when the cache state is fresh
//! 2. Refuses to go further while offline
//! 3. Walks the endpoints in order: a missing file moves on to the next
//!    repository, transient failures are retried by the downloader first
//! 4. Falls back to a stale cached copy when every repository failed
//!
//! A waiter that blocked on the lock while another thread or process
//! downloaded the same file sees it as fresh and returns without contacting
//! any repository.
//!
//! Mutable files are judged by the update policy of the repository that
//! served them, recorded next to the file; `force_refresh` overrides every
//! repository's policy with `always`.

use super::access::{Endpoint, RepositoryAccess};
use super::download::{Downloader, Transfer};
use super::snapshot::{METADATA_FILE, SnapshotVersioning};
use crate::cache::{CacheState, EntryLock, LocalRepository};
use crate::config::UpdatePolicy;
use crate::coordinate::Coordinate;
use crate::error::{Error, Result, TransportError};
use crate::events::{EventReporter, ResolutionEvent};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What a fetch is for, which decides the events it reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPurpose {
    /// A descriptor: repository lookups report metadata events
    Descriptor,
    /// An artifact: only transfer events are reported
    Artifact,
}

pub struct ArtifactFetcher {
    local: LocalRepository,
    access: RepositoryAccess,
    downloader: Downloader,
    events: EventReporter,
    /// Replaces every repository's update policy when set
    policy_override: Option<UpdatePolicy>,
}

impl ArtifactFetcher {
    pub fn new(
        local: LocalRepository,
        access: RepositoryAccess,
        downloader: Downloader,
        events: EventReporter,
        policy_override: Option<UpdatePolicy>,
    ) -> Self {
        Self {
            local,
            access,
            downloader,
            events,
            policy_override,
        }
    }

    pub fn local(&self) -> &LocalRepository {
        &self.local
    }

    pub fn access(&self) -> &RepositoryAccess {
        &self.access
    }

    /// Make a coordinate's file available locally and return its path
    pub fn fetch(
        &self,
        coord: &Coordinate,
        purpose: FetchPurpose,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let target = self.local.path_of(coord);
        let requested_at = SystemTime::now();
        let _lock = self.local.lock(coord, cancel)?;

        let state = self.local.state(
            &target,
            coord.is_snapshot(),
            self.cached_policy(&target),
            requested_at,
        );
        match state {
            CacheState::Fresh => {
                debug!("Cache hit for {} at {}", coord, target.display());
                return Ok(target);
            }
            CacheState::Stale if self.access.is_offline() => {
                debug!("Offline, using cached {} without revalidation", coord);
                return Ok(target);
            }
            CacheState::Stale | CacheState::Missing => {}
        }

        let endpoints = self.access.endpoints_for(coord)?;
        let mut failures: Vec<String> = Vec::new();
        let mut only_missing = true;

        for endpoint in endpoints {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if purpose == FetchPurpose::Descriptor {
                self.events.emit(ResolutionEvent::MetadataFetchStarted {
                    coordinate: coord.clone(),
                    repository: endpoint.id().to_string(),
                });
            }

            let remote_path = self.remote_path(coord, endpoint, cancel)?;
            let transfer = self
                .downloader
                .download(coord, endpoint, &remote_path, &self.local, &target, cancel);

            let reason = match transfer {
                Ok(Transfer::Installed(_)) => {
                    if coord.is_snapshot()
                        && let Err(e) = self.local.record_origin(&target, endpoint.id())
                    {
                        warn!("Could not record origin of {}: {}", target.display(), e);
                    }
                    if purpose == FetchPurpose::Descriptor {
                        self.events.emit(ResolutionEvent::MetadataFetchSucceeded {
                            coordinate: coord.clone(),
                            repository: endpoint.id().to_string(),
                        });
                    }
                    return Ok(target);
                }
                Ok(Transfer::NotFound) => "not found".to_string(),
                Ok(Transfer::Failed(reason)) => {
                    only_missing = false;
                    reason
                }
                Err(e) => {
                    if purpose == FetchPurpose::Descriptor {
                        self.metadata_failed(coord, endpoint, &e.to_string());
                    }
                    return Err(e);
                }
            };

            if purpose == FetchPurpose::Descriptor {
                self.metadata_failed(coord, endpoint, &reason);
            }
            failures.push(format!("{}: {}", endpoint.id(), reason));
        }

        if state == CacheState::Stale {
            warn!(
                "Could not refresh {} ({}), using cached copy",
                coord,
                failures.join("; ")
            );
            return Ok(target);
        }

        if only_missing {
            Err(Error::ArtifactNotFound {
                coordinate: coord.to_string(),
                repositories: self.access.describe(),
            })
        } else {
            Err(Error::download_failed(coord, failures.join("; ")))
        }
    }

    /// Update policy of one endpoint, unless overridden
    fn policy_for(&self, endpoint: &Endpoint) -> UpdatePolicy {
        self.policy_override
            .unwrap_or(endpoint.repository.policy.update)
    }

    /// Update policy for a cached file: that of the repository it came from
    ///
    /// Files of unknown origin fall back to the policy most repositories use.
    fn cached_policy(&self, target: &Path) -> UpdatePolicy {
        if let Some(policy) = self.policy_override {
            return policy;
        }
        self.local
            .origin(target)
            .and_then(|id| self.access.all().iter().find(|endpoint| endpoint.id() == id))
            .map(|endpoint| endpoint.repository.policy.update)
            .unwrap_or_else(|| self.access.update_policy())
    }

    fn metadata_failed(&self, coord: &Coordinate, endpoint: &Endpoint, error: &str) {
        self.events.emit(ResolutionEvent::MetadataFetchFailed {
            coordinate: coord.clone(),
            repository: endpoint.id().to_string(),
            error: error.to_string(),
        });
    }

    /// Repository-relative path to request from an endpoint
    ///
    /// Snapshots map to the timestamped file the repository deployed, or
    /// the non-unique name when the repository publishes no mapping.
    fn remote_path(
        &self,
        coord: &Coordinate,
        endpoint: &Endpoint,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if !coord.is_snapshot() {
            return Ok(coord.relative_path());
        }

        let version = self
            .snapshot_versioning(coord, endpoint, cancel)?
            .and_then(|versioning| versioning.remote_version(coord))
            .unwrap_or_else(|| coord.version().to_string());
        Ok(format!("{}/{}", coord.directory(), coord.file_name_for(&version)))
    }

    /// Version-level metadata of a snapshot from one endpoint, cached per repository
    fn snapshot_versioning(
        &self,
        coord: &Coordinate,
        endpoint: &Endpoint,
        cancel: &CancellationToken,
    ) -> Result<Option<SnapshotVersioning>> {
        let path = self.local.snapshot_metadata_path(coord, endpoint.id());
        let relative = format!("{}/{}", coord.directory(), METADATA_FILE);
        let requested_at = SystemTime::now();
        let _lock = EntryLock::acquire(
            &self.local.lock_path(&format!("{}@{}", relative, endpoint.id())),
            cancel,
        )?;

        if self.local.state(&path, true, self.policy_for(endpoint), requested_at) != CacheState::Fresh {
            self.events.emit(ResolutionEvent::MetadataFetchStarted {
                coordinate: coord.clone(),
                repository: endpoint.id().to_string(),
            });

            let url = endpoint.url_for(&relative);
            let mut temp = self.local.temp_file_for(&path)?;
            match self.downloader.transport().get(
                &endpoint.repository,
                &url,
                &mut temp,
                &mut |_, _| {},
                cancel,
            ) {
                Ok(_) => {
                    self.local.install(temp, &path)?;
                    self.events.emit(ResolutionEvent::MetadataFetchSucceeded {
                        coordinate: coord.clone(),
                        repository: endpoint.id().to_string(),
                    });
                }
                Err(TransportError::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    debug!("No snapshot metadata for {} in {}: {}", coord, endpoint.id(), e);
                    self.metadata_failed(coord, endpoint, &e.to_string());
                    if !path.is_file() {
                        return Ok(None);
                    }
                }
            }
        }

        let content = fs::read_to_string(&path)?;
        match SnapshotVersioning::parse(&content) {
            Ok(versioning) => Ok(Some(versioning)),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }
}
