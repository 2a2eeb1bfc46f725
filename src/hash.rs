// src/hash.rs

//! Checksums for transferred artifacts
//!
//! Repositories publish checksum sidecars next to every file
//! (`lib-1.0.jar.sha256`, `lib-1.0.jar.md5`). Digests are computed while the
//! bytes stream to disk, so verification never re-reads the file.

use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Write};

/// Checksum algorithm with a published sidecar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Sha256,
    Md5,
}

impl ChecksumAlgorithm {
    /// Sidecar lookup order, strongest first
    pub const LOOKUP_ORDER: [ChecksumAlgorithm; 2] = [ChecksumAlgorithm::Sha256, ChecksumAlgorithm::Md5];

    /// File extension of the sidecar (without the dot)
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Md5 => "md5",
        }
    }

    /// Length of the digest as lowercase hex
    pub const fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Md5 => 32,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Digests of a stream, one per algorithm
pub struct Digests {
    sha256: Sha256,
    md5: Md5,
}

impl Digests {
    pub fn new() -> Self {
        Self {
            sha256: Sha256::new(),
            md5: Md5::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.sha256.update(data);
        self.md5.update(data);
    }

    pub fn finish(self) -> ComputedChecksums {
        ComputedChecksums {
            sha256: hex::encode(self.sha256.finalize()),
            md5: hex::encode(self.md5.finalize()),
        }
    }
}

impl Default for Digests {
    fn default() -> Self {
        Self::new()
    }
}

/// Finished hex digests of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedChecksums {
    sha256: String,
    md5: String,
}

impl ComputedChecksums {
    pub fn get(&self, algorithm: ChecksumAlgorithm) -> &str {
        match algorithm {
            ChecksumAlgorithm::Sha256 => &self.sha256,
            ChecksumAlgorithm::Md5 => &self.md5,
        }
    }
}

/// Writer adapter that digests everything passing through it
pub struct DigestWriter<W: Write> {
    inner: W,
    digests: Digests,
    written: u64,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digests: Digests::new(),
            written: 0,
        }
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn finish(self) -> (W, ComputedChecksums) {
        (self.inner, self.digests.finish())
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digests.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Extract the digest from a sidecar file body
///
/// Sidecars hold either the bare digest or `digest  filename` as written by
/// `sha256sum`/`md5sum`.
pub fn parse_sidecar(content: &str, algorithm: ChecksumAlgorithm) -> Option<String> {
    let token = content.split_whitespace().next()?.to_ascii_lowercase();
    if token.len() == algorithm.hex_len() && token.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(token)
    } else {
        None
    }
}

/// Hex SHA-256 of a byte slice, used for lock file names
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
