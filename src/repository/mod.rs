// src/repository/mod.rs

//! Remote repository access
//!
//! This module provides functionality for:
//! - Selecting proxies, mirrors and credentials per repository
//! - Resolving the ordered endpoints a lookup walks, honoring offline mode
//! - Transferring bytes over HTTP(S) or from `file://` repositories
//! - Downloading with retry and checksum verification
//! - Cache-first fetching under the per-coordinate lock
//! - Mapping snapshot versions to deployed timestamped files

mod access;
mod download;
mod fetch;
mod snapshot;

pub mod selector;
pub mod transport;

pub use access::{Endpoint, RepositoryAccess};
pub use download::{Downloader, Transfer};
pub use fetch::{ArtifactFetcher, FetchPurpose};
pub use selector::{
    AuthSelector, MirrorSelector, PatternMirrorSelector, ProxySelector, Selectors, StaticAuthSelector,
    StaticProxySelector,
};
pub use snapshot::SnapshotVersioning;
pub use transport::{DefaultTransport, FileTransport, HttpTransport, Transport};
