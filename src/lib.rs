// src/lib.rs

//! Artifetch
//!
//! Transitive dependency resolution for Maven-layout repositories with a
//! local artifact cache that is safe to share between threads and
//! processes.
//!
//! # Architecture
//!
//! - Coordinates: immutable `group:name:version:kind[:classifier]` identities
//! - Descriptors: POMs with parent inheritance, interpolation and management
//! - Collection: breadth-first traversal with nearest-wins conflict resolution
//! - Repositories: ordered endpoints with proxy, mirror and auth selection
//! - Local repository: per-coordinate locks and atomic rename-into-place
//! - Events: typed lifecycle events delivered to an injected listener

pub mod cache;
pub mod config;
pub mod coordinate;
mod error;
pub mod events;
pub mod hash;
pub mod metadata;
pub mod repository;
pub mod resolver;

pub use cache::LocalRepository;
pub use config::{
    ChecksumPolicy, Credentials, Proxy, RemoteRepository, RepositoryPolicy, ResolverConfig, UpdatePolicy,
};
pub use coordinate::{Coordinate, DependencyEdge, Exclusion, Scope};
pub use error::{Error, Failure, FailureKind, Result, TransportError};
pub use events::{CallbackListener, LogListener, ResolutionEvent, ResolutionListener, SilentListener};
pub use resolver::{
    ArtifactOutcome, Conflict, DependencyGraph, GraphNode, ResolutionResult, Resolver, ResolverBuilder,
};
