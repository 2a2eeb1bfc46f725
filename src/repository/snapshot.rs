// src/repository/snapshot.rs

//! Snapshot version metadata
//!
//! Repositories store deployed snapshots under timestamped file names and
//! publish the mapping in `group/name/1.0-SNAPSHOT/maven-metadata.xml`:
//!
//! ```xml
//! <metadata>
//!   <versioning>
//!     <snapshot><timestamp>20240101.120000</timestamp><buildNumber>3</buildNumber></snapshot>
//!     <snapshotVersions>
//!       <snapshotVersion>
//!         <extension>jar</extension>
//!         <value>1.0-20240101.120000-3</value>
//!       </snapshotVersion>
//!     </snapshotVersions>
//!   </versioning>
//! </metadata>
//! ```

use crate::coordinate::{Coordinate, SNAPSHOT};
use crate::error::Result;
use crate::metadata::xml;

/// File name of version-level metadata in a remote repository
pub const METADATA_FILE: &str = "maven-metadata.xml";

/// Parsed snapshot versioning of one base version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotVersioning {
    timestamp: Option<String>,
    build_number: Option<String>,
    local_copy: bool,
    versions: Vec<SnapshotVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SnapshotVersion {
    extension: String,
    classifier: Option<String>,
    value: String,
}

impl SnapshotVersioning {
    pub fn parse(content: &str) -> Result<Self> {
        let root = xml::parse(content)?;
        let Some(versioning) = root.child("versioning") else {
            return Ok(Self::default());
        };

        let versions = versioning
            .child("snapshotVersions")
            .map(|list| {
                list.children_named("snapshotVersion")
                    .filter_map(|entry| {
                        Some(SnapshotVersion {
                            extension: entry.text_at("extension")?,
                            classifier: entry.text_at("classifier"),
                            value: entry.text_at("value")?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            timestamp: versioning.text_at("snapshot/timestamp"),
            build_number: versioning.text_at("snapshot/buildNumber"),
            local_copy: versioning
                .text_at("snapshot/localCopy")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            versions,
        })
    }

    /// Remote version string for an artifact of this snapshot
    ///
    /// Prefers the per-file `snapshotVersions` entry, then the global
    /// timestamp and build number. `None` means the non-unique
    /// `-SNAPSHOT` file name is used.
    pub fn remote_version(&self, coord: &Coordinate) -> Option<String> {
        let extension = coord.extension();
        let classifier = coord.file_classifier();

        if let Some(entry) = self
            .versions
            .iter()
            .find(|v| v.extension == extension && v.classifier.as_deref() == classifier)
        {
            return Some(entry.value.clone());
        }

        if self.local_copy {
            return None;
        }
        let (timestamp, build) = (self.timestamp.as_ref()?, self.build_number.as_ref()?);
        let base = coord.version().strip_suffix(SNAPSHOT)?;
        Some(format!("{}{}-{}", base, timestamp, build))
    }
}
