// src/cache/mod.rs

//! Local artifact repository
//!
//! The local repository is a directory tree in the standard remote layout
//! (`group/with/slashes/name/baseVersion/name-version[-classifier].ext`).
//! It is shared by every resolver in the process and by other processes
//! pointed at the same root.
//!
//! # Guarantees
//!
//! - Files only appear through [`LocalRepository::install`], which renames a
//!   fully written temp file from the same directory into place. A reader
//!   never observes a partial artifact.
//! - Writers hold an [`EntryLock`] for the coordinate, so one coordinate is
//!   transferred at most once at a time across threads and processes.
//! - Abandoned temp files are removed when their handle drops.

pub mod lock;

pub use lock::EntryLock;

use crate::config::UpdatePolicy;
use crate::coordinate::Coordinate;
use crate::error::{Error, Result};
use crate::hash::sha256_hex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Directory under the root holding cross-process lock files
const LOCKS_DIR: &str = ".locks";

/// State of a cache entry relative to an update policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Missing,
    Fresh,
    Stale,
}

/// A local repository rooted at a directory
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    /// Open (and create if needed) a local repository
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!("Local repository at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of an artifact
    ///
    /// Snapshot artifacts are stored under their base version, whatever
    /// timestamped file the remote served.
    pub fn path_of(&self, coord: &Coordinate) -> PathBuf {
        self.root.join(coord.relative_path())
    }

    /// Local copy of a repository's version-level metadata for a snapshot
    pub fn snapshot_metadata_path(&self, coord: &Coordinate, repository_id: &str) -> PathBuf {
        self.root
            .join(coord.directory())
            .join(format!("maven-metadata-{}.xml", repository_id))
    }

    /// Lock file guarding a repository-relative path
    pub fn lock_path(&self, relative: &str) -> PathBuf {
        self.root
            .join(LOCKS_DIR)
            .join(format!("{}.lock", sha256_hex(relative.as_bytes())))
    }

    /// Acquire the exclusive lock for a coordinate's entry
    pub fn lock(&self, coord: &Coordinate, cancel: &CancellationToken) -> Result<EntryLock> {
        EntryLock::acquire(&self.lock_path(&coord.relative_path()), cancel)
    }

    /// Judge an entry against an update policy
    ///
    /// Immutable (release) entries are fresh whenever they exist. Mutable
    /// entries go stale per the policy, except that anything written at or
    /// after `requested_at` is fresh: another writer fetched it for us while
    /// we waited on the lock.
    pub fn state(
        &self,
        path: &Path,
        mutable: bool,
        policy: UpdatePolicy,
        requested_at: SystemTime,
    ) -> CacheState {
        let Ok(metadata) = fs::metadata(path) else {
            return CacheState::Missing;
        };
        if !metadata.is_file() {
            return CacheState::Missing;
        }
        if !mutable {
            return CacheState::Fresh;
        }

        let Ok(modified) = metadata.modified() else {
            return CacheState::Stale;
        };
        if modified >= requested_at {
            return CacheState::Fresh;
        }

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        if policy.is_stale(age) {
            CacheState::Stale
        } else {
            CacheState::Fresh
        }
    }

    /// Temp file in the target's directory, removed on drop unless installed
    pub fn temp_file_for(&self, target: &Path) -> Result<NamedTempFile> {
        let parent = target
            .parent()
            .ok_or_else(|| Error::Io(std::io::Error::other("target has no parent directory")))?;
        fs::create_dir_all(parent)?;

        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".part")
            .tempfile_in(parent)?;
        Ok(temp)
    }

    /// Marker naming the repository a mutable file was last fetched from
    fn origin_path(target: &Path) -> PathBuf {
        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        target.with_file_name(format!("{}.repository", file_name))
    }

    /// Remember which repository served `target`
    pub fn record_origin(&self, target: &Path, repository_id: &str) -> Result<()> {
        let marker = Self::origin_path(target);
        let mut temp = self.temp_file_for(&marker)?;
        temp.write_all(repository_id.as_bytes())?;
        self.install(temp, &marker)
    }

    /// Repository that last served `target`, if recorded
    pub fn origin(&self, target: &Path) -> Option<String> {
        let id = fs::read_to_string(Self::origin_path(target)).ok()?;
        let id = id.trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    /// Atomically rename a finished temp file into place
    pub fn install(&self, temp: NamedTempFile, target: &Path) -> Result<()> {
        temp.as_file().sync_all()?;
        temp.persist(target).map_err(|e| Error::Io(e.error))?;
        debug!("Installed {}", target.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    fn coord(version: &str) -> Coordinate {
        Coordinate::new("org.example", "lib", version, "jar").unwrap()
    }

    #[test]
    fn test_paths() {
        let temp_dir = TempDir::new().unwrap();
        let repo = LocalRepository::open(temp_dir.path().join("repo")).unwrap();
        assert!(repo.root().is_dir());

        assert_eq!(
            repo.path_of(&coord("1.0")),
            repo.root().join("org/example/lib/1.0/lib-1.0.jar")
        );
        assert_eq!(
            repo.snapshot_metadata_path(&coord("1.0-SNAPSHOT"), "central"),
            repo.root()
                .join("org/example/lib/1.0-SNAPSHOT/maven-metadata-central.xml")
        );

        let lock = repo.lock_path("org/example/lib/1.0/lib-1.0.jar");
        assert!(lock.starts_with(repo.root().join(".locks")));
        assert_ne!(lock, repo.lock_path("org/example/lib/1.1/lib-1.1.jar"));
    }

    #[test]
    fn test_install_is_atomic_rename() {
        let temp_dir = TempDir::new().unwrap();
        let repo = LocalRepository::open(temp_dir.path()).unwrap();
        let target = repo.path_of(&coord("1.0"));

        let mut temp = repo.temp_file_for(&target).unwrap();
        temp.write_all(b"jar bytes").unwrap();
        assert!(!target.exists());

        repo.install(temp, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"jar bytes");

        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_abandoned_temp_is_removed() {
        let temp_dir = TempDir::new().unwrap();
        let repo = LocalRepository::open(temp_dir.path()).unwrap();
        let target = repo.path_of(&coord("1.0"));

        let temp = repo.temp_file_for(&target).unwrap();
        let temp_path = temp.path().to_path_buf();
        assert!(temp_path.exists());
        drop(temp);
        assert!(!temp_path.exists());
        assert!(!target.exists());
    }

    #[test]
    fn test_cache_state() {
        let temp_dir = TempDir::new().unwrap();
        let repo = LocalRepository::open(temp_dir.path()).unwrap();
        let target = repo.path_of(&coord("1.0"));
        let requested_at = SystemTime::now() + Duration::from_secs(3600);

        assert_eq!(
            repo.state(&target, false, UpdatePolicy::Always, requested_at),
            CacheState::Missing
        );

        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, b"x").unwrap();

        // Releases are trusted regardless of policy
        assert_eq!(
            repo.state(&target, false, UpdatePolicy::Always, requested_at),
            CacheState::Fresh
        );
        assert_eq!(
            repo.state(&target, true, UpdatePolicy::Always, requested_at),
            CacheState::Stale
        );
        assert_eq!(
            repo.state(&target, true, UpdatePolicy::Never, requested_at),
            CacheState::Fresh
        );

        // Written after the request started: fresh even under "always"
        let earlier = SystemTime::now() - Duration::from_secs(3600);
        assert_eq!(
            repo.state(&target, true, UpdatePolicy::Always, earlier),
            CacheState::Fresh
        );
    }

    #[test]
    fn test_origin_marker() {
        let temp_dir = TempDir::new().unwrap();
        let repo = LocalRepository::open(temp_dir.path()).unwrap();
        let target = repo.path_of(&coord("1.0-SNAPSHOT"));
        assert_eq!(repo.origin(&target), None);

        repo.record_origin(&target, "snapshots").unwrap();
        assert_eq!(repo.origin(&target).as_deref(), Some("snapshots"));
        assert!(target.with_file_name("lib-1.0-SNAPSHOT.jar.repository").is_file());

        repo.record_origin(&target, "nightly").unwrap();
        assert_eq!(repo.origin(&target).as_deref(), Some("nightly"));
    }
}
