// tests/common/mod.rs

//! Shared fixtures for integration tests: file-based remote repositories,
//! recording listeners and instrumented transports.

#![allow(dead_code)]

use artifetch::repository::transport::{FileTransport, ProgressFn, Transport};
use artifetch::{
    Coordinate, RemoteRepository, ResolutionEvent, ResolutionListener, ResolverConfig, TransportError,
};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

static TRACING: Once = Once::new();

/// Route test logs through tracing-subscriber, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Parse a coordinate, panicking on bad test input
pub fn coord(spec: &str) -> Coordinate {
    spec.parse().unwrap()
}

/// A declared dependency in a fixture descriptor
#[derive(Debug, Clone)]
pub struct Dep {
    coord: Coordinate,
    scope: Option<&'static str>,
    optional: bool,
    exclusions: Vec<(&'static str, &'static str)>,
}

impl Dep {
    pub fn new(spec: &str) -> Self {
        Self {
            coord: coord(spec),
            scope: None,
            optional: false,
            exclusions: Vec::new(),
        }
    }

    pub fn scope(mut self, scope: &'static str) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn exclude(mut self, group: &'static str, name: &'static str) -> Self {
        self.exclusions.push((group, name));
        self
    }

    fn to_xml(&self) -> String {
        let mut xml = format!(
            "<dependency><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version>",
            self.coord.group(),
            self.coord.name(),
            self.coord.version()
        );
        if self.coord.kind() != "jar" {
            xml.push_str(&format!("<type>{}</type>", self.coord.kind()));
        }
        if let Some(classifier) = self.coord.classifier() {
            xml.push_str(&format!("<classifier>{classifier}</classifier>"));
        }
        if let Some(scope) = self.scope {
            xml.push_str(&format!("<scope>{scope}</scope>"));
        }
        if self.optional {
            xml.push_str("<optional>true</optional>");
        }
        if !self.exclusions.is_empty() {
            xml.push_str("<exclusions>");
            for (group, name) in &self.exclusions {
                xml.push_str(&format!(
                    "<exclusion><groupId>{group}</groupId><artifactId>{name}</artifactId></exclusion>"
                ));
            }
            xml.push_str("</exclusions>");
        }
        xml.push_str("</dependency>");
        xml
    }
}

/// A Maven-layout repository in a temp directory, served over `file://`
pub struct FixtureRepo {
    dir: TempDir,
    id: String,
}

impl FixtureRepo {
    pub fn new(id: &str) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            id: id.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self) -> String {
        url::Url::from_directory_path(self.dir.path()).unwrap().to_string()
    }

    pub fn repository(&self) -> RemoteRepository {
        RemoteRepository::new(self.id.clone(), self.url())
    }

    /// Publish a descriptor and a jar whose content is the coordinate string
    pub fn publish(&self, spec: &str, deps: &[&str]) -> &Self {
        let deps: Vec<Dep> = deps.iter().map(|d| Dep::new(d)).collect();
        self.publish_deps(spec, &deps)
    }

    pub fn publish_deps(&self, spec: &str, deps: &[Dep]) -> &Self {
        let coord = coord(spec);
        self.publish_pom(&coord, deps);
        self.write(&coord.relative_path(), coord.to_string().as_bytes());
        self
    }

    /// Publish only the descriptor, leaving the artifact missing
    pub fn publish_pom(&self, coord: &Coordinate, deps: &[Dep]) {
        let body: String = deps.iter().map(Dep::to_xml).collect();
        let pom = format!(
            "<project><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version>\
             <dependencies>{body}</dependencies></project>",
            coord.group(),
            coord.name(),
            coord.version()
        );
        self.write(&coord.descriptor().relative_path(), pom.as_bytes());
    }

    pub fn write(&self, relative: &str, body: &[u8]) {
        let path = self.dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.dir.path().join(relative)).unwrap();
    }
}

/// Configuration over the given repositories with a fresh local repository
pub fn config(local: &TempDir, repos: &[&FixtureRepo]) -> ResolverConfig {
    ResolverConfig::new(local.path())
        .with_repositories(repos.iter().map(|repo| repo.repository()).collect())
        .with_threads(4)
}

/// Listener that keeps every event it sees
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ResolutionEvent>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<ResolutionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn repository_requests(&self) -> usize {
        self.events().iter().filter(|e| e.is_repository_request()).count()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name() == name).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl ResolutionListener for RecordingListener {
    fn on_event(&self, event: &ResolutionEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// File transport that counts requests per URL and can slow transfers down
#[derive(Default)]
pub struct CountingTransport {
    inner: FileTransport,
    requests: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl CountingTransport {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Requests made for URLs ending in `suffix`
    pub fn requests_ending_with(&self, suffix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.ends_with(suffix))
            .map(|(_, count)| count)
            .sum()
    }

    pub fn total(&self) -> usize {
        self.requests.lock().unwrap().values().sum()
    }
}

impl Transport for CountingTransport {
    fn get(
        &self,
        repository: &RemoteRepository,
        url: &str,
        sink: &mut dyn Write,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, TransportError> {
        *self.requests.lock().unwrap().entry(url.to_string()).or_default() += 1;
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.inner.get(repository, url, sink, progress, cancel)
    }
}

/// Transport whose transfers of jars hang until cancelled
///
/// Descriptors pass straight through to the file transport.
#[derive(Default)]
pub struct HangingTransport {
    inner: FileTransport,
    pub started: Arc<Mutex<bool>>,
}

impl Transport for HangingTransport {
    fn get(
        &self,
        repository: &RemoteRepository,
        url: &str,
        sink: &mut dyn Write,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, TransportError> {
        if !url.ends_with(".jar") {
            return self.inner.get(repository, url, sink, progress, cancel);
        }
        *self.started.lock().unwrap() = true;
        sink.write_all(b"partial").map_err(|e| TransportError::Fatal(e.to_string()))?;
        while !cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(10));
        }
        Err(TransportError::Cancelled)
    }
}
