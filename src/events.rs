// src/events.rs

//! Resolution event reporting
//!
//! Every repository lookup and byte transfer is reported to a
//! [`ResolutionListener`]. Listeners are pure observers: an error or panic
//! raised by a listener is logged and swallowed, it never changes the outcome
//! of a resolution.
//!
//! # Implementations
//!
//! - `SilentListener`: no-op
//! - `LogListener`: forwards events to tracing
//! - `CallbackListener`: calls a user-provided closure
//!
//! # Example
//!
//! ```ignore
//! use artifetch::events::{CallbackListener, ResolutionEvent};
//!
//! let listener = CallbackListener::new(|event: &ResolutionEvent| {
//!     println!("{event}");
//!     Ok(())
//! });
//! ```

use crate::coordinate::Coordinate;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Events emitted during a resolution run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionEvent {
    /// A descriptor lookup against one repository began
    MetadataFetchStarted {
        coordinate: Coordinate,
        repository: String,
    },
    /// A descriptor was obtained from a repository
    MetadataFetchSucceeded {
        coordinate: Coordinate,
        repository: String,
    },
    /// A descriptor lookup against one repository failed
    MetadataFetchFailed {
        coordinate: Coordinate,
        repository: String,
        error: String,
    },
    /// A byte transfer began
    DownloadStarted {
        coordinate: Coordinate,
        repository: String,
        url: String,
    },
    /// Bytes arrived; `total` is known when the server sent a length
    DownloadProgressed {
        coordinate: Coordinate,
        repository: String,
        transferred: u64,
        total: Option<u64>,
    },
    /// A transfer completed and the file is in place
    DownloadSucceeded {
        coordinate: Coordinate,
        repository: String,
        bytes: u64,
    },
    /// A transfer attempt failed
    DownloadFailed {
        coordinate: Coordinate,
        repository: String,
        error: String,
    },
    /// A node lost nearest-wins conflict resolution
    ConflictResolved { loser: Coordinate, winner: Coordinate },
}

impl ResolutionEvent {
    /// Short method-style name of the event kind
    pub fn name(&self) -> &'static str {
        match self {
            ResolutionEvent::MetadataFetchStarted { .. } => "metadataFetchStarted",
            ResolutionEvent::MetadataFetchSucceeded { .. } => "metadataFetchSucceeded",
            ResolutionEvent::MetadataFetchFailed { .. } => "metadataFetchFailed",
            ResolutionEvent::DownloadStarted { .. } => "downloadStarted",
            ResolutionEvent::DownloadProgressed { .. } => "downloadProgressed",
            ResolutionEvent::DownloadSucceeded { .. } => "downloadSucceeded",
            ResolutionEvent::DownloadFailed { .. } => "downloadFailed",
            ResolutionEvent::ConflictResolved { .. } => "conflictResolved",
        }
    }

    /// Whether this event reports contact with a remote repository
    pub fn is_repository_request(&self) -> bool {
        matches!(
            self,
            ResolutionEvent::MetadataFetchStarted { .. } | ResolutionEvent::DownloadStarted { .. }
        )
    }
}

impl fmt::Display for ResolutionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionEvent::MetadataFetchStarted { coordinate, repository }
            | ResolutionEvent::MetadataFetchSucceeded { coordinate, repository } => {
                write!(f, "{} :: {} ({})", self.name(), coordinate, repository)
            }
            ResolutionEvent::MetadataFetchFailed {
                coordinate,
                repository,
                error,
            }
            | ResolutionEvent::DownloadFailed {
                coordinate,
                repository,
                error,
            } => write!(f, "{} :: {} ({}): {}", self.name(), coordinate, repository, error),
            ResolutionEvent::DownloadStarted {
                coordinate, url, ..
            } => write!(f, "{} :: {} <- {}", self.name(), coordinate, url),
            ResolutionEvent::DownloadProgressed {
                coordinate,
                transferred,
                total,
                ..
            } => match total {
                Some(total) => write!(f, "{} :: {} {}/{}", self.name(), coordinate, transferred, total),
                None => write!(f, "{} :: {} {}", self.name(), coordinate, transferred),
            },
            ResolutionEvent::DownloadSucceeded {
                coordinate, bytes, ..
            } => write!(f, "{} :: {} ({} bytes)", self.name(), coordinate, bytes),
            ResolutionEvent::ConflictResolved { loser, winner } => {
                write!(f, "{} :: {} lost to {}", self.name(), loser, winner)
            }
        }
    }
}

/// Observer of resolution events
///
/// Implementations must be thread-safe: events arrive from worker threads.
pub trait ResolutionListener: Send + Sync {
    fn on_event(&self, event: &ResolutionEvent) -> anyhow::Result<()>;
}

/// Listener that ignores everything
#[derive(Debug, Default)]
pub struct SilentListener;

impl ResolutionListener for SilentListener {
    fn on_event(&self, _event: &ResolutionEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Listener that logs events to tracing
///
/// Progress events are logged at debug level, everything else at info.
#[derive(Debug, Default)]
pub struct LogListener;

impl ResolutionListener for LogListener {
    fn on_event(&self, event: &ResolutionEvent) -> anyhow::Result<()> {
        match event {
            ResolutionEvent::DownloadProgressed { .. } => debug!("{}", event),
            _ => info!("{}", event),
        }
        Ok(())
    }
}

/// Listener that calls a user-provided function
pub struct CallbackListener<F>
where
    F: Fn(&ResolutionEvent) -> anyhow::Result<()> + Send + Sync,
{
    callback: F,
}

impl<F> CallbackListener<F>
where
    F: Fn(&ResolutionEvent) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ResolutionListener for CallbackListener<F>
where
    F: Fn(&ResolutionEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &ResolutionEvent) -> anyhow::Result<()> {
        (self.callback)(event)
    }
}

/// Dispatches events to a listener, isolating its failures
#[derive(Clone)]
pub struct EventReporter {
    listener: Arc<dyn ResolutionListener>,
}

impl EventReporter {
    pub fn new(listener: Arc<dyn ResolutionListener>) -> Self {
        Self { listener }
    }

    /// Reporter that drops every event
    pub fn silent() -> Self {
        Self::new(Arc::new(SilentListener))
    }

    /// Deliver an event; listener errors and panics are logged, never propagated
    pub fn emit(&self, event: ResolutionEvent) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.listener.on_event(&event)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Listener failed on {}: {:#}", event.name(), e),
            Err(_) => warn!("Listener panicked on {}", event.name()),
        }
    }
}

impl fmt::Debug for EventReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventReporter").finish_non_exhaustive()
    }
}
