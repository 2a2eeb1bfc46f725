// src/repository/download.rs

//! Download executor
//!
//! Transfers one remote file into the local repository:
//!
//! - Streams into a temp file beside the target, digesting as it goes
//! - Retries the same repository on transient failure, with backoff
//! - Verifies checksum sidecars per the repository's checksum policy
//! - Renames the finished file into place
//!
//! Every attempt is reported through the event reporter as
//! `DownloadStarted`, `DownloadProgressed`..., then `DownloadSucceeded` or
//! `DownloadFailed`.

use super::access::Endpoint;
use super::transport::Transport;
use crate::cache::LocalRepository;
use crate::config::ChecksumPolicy;
use crate::coordinate::Coordinate;
use crate::error::{Error, Result, TransportError};
use crate::events::{EventReporter, ResolutionEvent};
use crate::hash::{ChecksumAlgorithm, ComputedChecksums, DigestWriter, parse_sidecar};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Base retry delay; attempt `n` waits `n` times this
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Granularity of cancellable waits
const WAIT_STEP: Duration = Duration::from_millis(50);

/// Emit progress events at most once per this many bytes
const PROGRESS_STEP: u64 = 64 * 1024;

/// Outcome of transferring from one repository
#[derive(Debug)]
pub enum Transfer {
    /// File installed at the target, with its size
    Installed(u64),
    /// The repository does not have the file
    NotFound,
    /// The repository failed; try the next one
    Failed(String),
}

/// Executes transfers with retry and checksum verification
#[derive(Clone)]
pub struct Downloader {
    transport: Arc<dyn Transport>,
    retries: u32,
    events: EventReporter,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>, retries: u32, events: EventReporter) -> Self {
        Self {
            transport,
            retries,
            events,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Download `remote_path` from an endpoint and install it at `target`
    ///
    /// Only cancellation and local I/O failures are returned as errors;
    /// anything the next repository might fix is a [`Transfer`] value.
    pub fn download(
        &self,
        coord: &Coordinate,
        endpoint: &Endpoint,
        remote_path: &str,
        local: &LocalRepository,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<Transfer> {
        let url = endpoint.url_for(remote_path);
        let attempts = self.retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                warn!(
                    "Download attempt {} of {} failed: {}, retrying...",
                    attempt - 1,
                    url,
                    last_error
                );
                wait(RETRY_DELAY * (attempt - 1), cancel)?;
            }

            match self.attempt(coord, endpoint, &url, local, target, cancel)? {
                Attempt::Installed(bytes) => return Ok(Transfer::Installed(bytes)),
                Attempt::NotFound => return Ok(Transfer::NotFound),
                Attempt::Fatal(reason) => return Ok(Transfer::Failed(reason)),
                Attempt::Transient(reason) => last_error = reason,
            }
        }

        Ok(Transfer::Failed(format!(
            "{} after {} attempts",
            last_error, attempts
        )))
    }

    fn attempt(
        &self,
        coord: &Coordinate,
        endpoint: &Endpoint,
        url: &str,
        local: &LocalRepository,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<Attempt> {
        let repository = endpoint.id().to_string();
        self.events.emit(ResolutionEvent::DownloadStarted {
            coordinate: coord.clone(),
            repository: repository.clone(),
            url: url.to_string(),
        });

        let temp = local.temp_file_for(target)?;
        let mut writer = DigestWriter::new(temp);
        let mut reported = 0u64;
        let result = self.transport.get(
            &endpoint.repository,
            url,
            &mut writer,
            &mut |transferred, total| {
                if transferred - reported >= PROGRESS_STEP || Some(transferred) == total {
                    reported = transferred;
                    self.events.emit(ResolutionEvent::DownloadProgressed {
                        coordinate: coord.clone(),
                        repository: repository.clone(),
                        transferred,
                        total,
                    });
                }
            },
            cancel,
        );

        let outcome = match result {
            Ok(bytes) => {
                writer.flush()?;
                let (temp, checksums) = writer.finish();
                match self.verify(endpoint, url, &checksums, cancel)? {
                    Ok(()) => {
                        local.install(temp, target)?;
                        info!("Downloaded {} ({} bytes) from {}", coord, bytes, repository);
                        self.events.emit(ResolutionEvent::DownloadSucceeded {
                            coordinate: coord.clone(),
                            repository: repository.clone(),
                            bytes,
                        });
                        return Ok(Attempt::Installed(bytes));
                    }
                    Err(reason) => Attempt::Fatal(reason),
                }
            }
            Err(TransportError::Cancelled) => {
                self.fail(coord, &repository, "cancelled");
                return Err(Error::Cancelled);
            }
            Err(TransportError::NotFound) => Attempt::NotFound,
            Err(TransportError::Transient(reason)) => Attempt::Transient(reason),
            Err(TransportError::Fatal(reason)) => Attempt::Fatal(reason),
        };

        let reason = match &outcome {
            Attempt::NotFound => format!("{url} not found"),
            Attempt::Transient(reason) | Attempt::Fatal(reason) => reason.clone(),
            Attempt::Installed(_) => String::new(),
        };
        debug!("Transfer of {} from {} failed: {}", coord, repository, reason);
        self.fail(coord, &repository, &reason);
        Ok(outcome)
    }

    fn fail(&self, coord: &Coordinate, repository: &str, reason: &str) {
        self.events.emit(ResolutionEvent::DownloadFailed {
            coordinate: coord.clone(),
            repository: repository.to_string(),
            error: reason.to_string(),
        });
    }

    /// Check digests against the repository's sidecars
    ///
    /// The inner `Err` rejects the file under the `fail` policy.
    fn verify(
        &self,
        endpoint: &Endpoint,
        url: &str,
        checksums: &ComputedChecksums,
        cancel: &CancellationToken,
    ) -> Result<std::result::Result<(), String>> {
        let policy = endpoint.repository.policy.checksum;
        if policy == ChecksumPolicy::Ignore {
            return Ok(Ok(()));
        }

        for algorithm in ChecksumAlgorithm::LOOKUP_ORDER {
            let sidecar_url = format!("{}.{}", url, algorithm.extension());
            let body = match self.transport.get_bytes(&endpoint.repository, &sidecar_url, cancel) {
                Ok(body) => body,
                Err(TransportError::Cancelled) => return Err(Error::Cancelled),
                Err(TransportError::NotFound) => continue,
                Err(e) => {
                    debug!("Could not fetch {}: {}", sidecar_url, e);
                    continue;
                }
            };

            let Some(expected) = parse_sidecar(&String::from_utf8_lossy(&body), algorithm) else {
                warn!("Ignoring unreadable checksum file {}", sidecar_url);
                continue;
            };
            let actual = checksums.get(algorithm);
            if expected == actual {
                debug!("{} checksum verified for {}", algorithm, url);
                return Ok(Ok(()));
            }

            let mismatch = Error::ChecksumMismatch {
                url: url.to_string(),
                expected,
                actual: actual.to_string(),
            };
            return Ok(match policy {
                ChecksumPolicy::Fail => Err(mismatch.to_string()),
                _ => {
                    warn!("{}", mismatch);
                    Ok(())
                }
            });
        }

        match policy {
            ChecksumPolicy::Fail => Ok(Err(format!("No checksum available for {url}"))),
            _ => {
                warn!("No checksum available for {}", url);
                Ok(Ok(()))
            }
        }
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

enum Attempt {
    Installed(u64),
    NotFound,
    Transient(String),
    Fatal(String),
}

/// Sleep, waking early with `Cancelled` if the token fires
pub(crate) fn wait(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let step = remaining.min(WAIT_STEP);
        std::thread::sleep(step);
        remaining -= step;
    }
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}
