// src/error.rs

//! Error types for resolution, caching and transfer
//!
//! `Error` covers everything a resolution run can report. Most variants are
//! recorded per coordinate in the [`ResolutionResult`](crate::ResolutionResult)
//! rather than returned from `resolve`; only [`Error::Cancelled`] and input
//! errors abort a whole call.

use crate::coordinate::Coordinate;
use std::path::PathBuf;
use strum_macros::{Display, EnumString};
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No repository provides a descriptor for {coordinate}: {reason}")]
    MetadataUnavailable { coordinate: String, reason: String },

    #[error("Descriptor for {coordinate} is corrupt: {reason}")]
    MetadataCorrupt { coordinate: String, reason: String },

    #[error("{coordinate} was not found in any of [{repositories}]")]
    ArtifactNotFound {
        coordinate: String,
        repositories: String,
    },

    #[error("Failed to download {coordinate}: {reason}")]
    DownloadFailed { coordinate: String, reason: String },

    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Cannot access remote repositories for {coordinate} while offline")]
    OfflineViolation { coordinate: String },

    #[error("Failed to lock {}: {source}", path.display())]
    LockFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Resolution was cancelled")]
    Cancelled,

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn metadata_unavailable(coordinate: &Coordinate, reason: impl Into<String>) -> Self {
        Error::MetadataUnavailable {
            coordinate: coordinate.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn metadata_corrupt(coordinate: &Coordinate, reason: impl Into<String>) -> Self {
        Error::MetadataCorrupt {
            coordinate: coordinate.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn download_failed(coordinate: &Coordinate, reason: impl Into<String>) -> Self {
        Error::DownloadFailed {
            coordinate: coordinate.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error aborts a whole resolution run
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Classify this error for per-coordinate reporting
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::MetadataUnavailable { .. } => FailureKind::MetadataUnavailable,
            Error::MetadataCorrupt { .. } | Error::Xml(_) => FailureKind::MetadataCorrupt,
            Error::OfflineViolation { .. } => FailureKind::OfflineViolation,
            Error::LockFailed { .. } => FailureKind::LockFailed,
            Error::Cancelled => FailureKind::Cancelled,
            Error::ArtifactNotFound { .. }
            | Error::DownloadFailed { .. }
            | Error::ChecksumMismatch { .. } => FailureKind::DownloadFailed,
            Error::Io(_) => FailureKind::DownloadFailed,
            Error::InvalidCoordinate(_) | Error::InvalidConfig(_) | Error::Config(_) => {
                FailureKind::InvalidInput
            }
        }
    }
}

/// Why a coordinate ended up unresolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum FailureKind {
    MetadataUnavailable,
    MetadataCorrupt,
    DownloadFailed,
    OfflineViolation,
    LockFailed,
    Cancelled,
    InvalidInput,
}

/// Cloneable record of a per-coordinate failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&Error> for Failure {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Transport-level failure, classified for retry decisions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The repository definitively does not have the resource
    #[error("not found")]
    NotFound,

    /// Network hiccup worth retrying against the same repository
    #[error("transient failure: {0}")]
    Transient(String),

    /// Failure that retrying will not fix (auth, bad URL, unsupported scheme)
    #[error("{0}")]
    Fatal(String),

    #[error("cancelled")]
    Cancelled,
}
