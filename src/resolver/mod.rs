// src/resolver/mod.rs

//! Transitive dependency resolution
//!
//! A [`Resolver`] turns root coordinates into a [`ResolutionResult`]:
//!
//! 1. The graph collector walks declared dependencies breadth-first,
//!    fetching descriptors through the local repository
//! 2. Conflict resolution picks the nearest version per artifact
//! 3. Winning artifacts are downloaded in parallel
//!
//! Per-coordinate failures end up in the result; only cancellation makes
//! [`Resolver::resolve_with_cancel`] fail.
//!
//! # Example
//!
//! ```ignore
//! use artifetch::{Resolver, ResolverConfig};
//!
//! let resolver = Resolver::new(ResolverConfig::new("/home/me/.m2/repository"))?;
//! let result = resolver.resolve(&["org.ow2.asm:asm:5.0.1".parse()?])?;
//! for (coord, path) in result.resolved() {
//!     println!("{coord} -> {}", path.display());
//! }
//! ```

mod collect;
mod conflict;
mod graph;
mod result;

pub use collect::GraphCollector;
pub use conflict::{Conflict, resolve_conflicts};
pub use graph::{DependencyGraph, GraphNode, NodeId};
pub use result::{ArtifactOutcome, ResolutionResult};

use crate::cache::LocalRepository;
use crate::config::{ResolverConfig, UpdatePolicy};
use crate::coordinate::Coordinate;
use crate::error::{Error, Failure, Result};
use crate::events::{EventReporter, ResolutionListener, SilentListener};
use crate::metadata::MetadataResolver;
use crate::repository::{
    ArtifactFetcher, AuthSelector, DefaultTransport, Downloader, FetchPurpose, MirrorSelector, ProxySelector,
    RepositoryAccess, Selectors, Transport,
};
use indexmap::IndexMap;
use rayon::ThreadPool;
use rayon::prelude::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Resolves coordinates against the configured repositories
///
/// A resolver is safe to share between threads; concurrent calls
/// coordinate through the local repository's entry locks.
pub struct Resolver {
    fetcher: Arc<ArtifactFetcher>,
    events: EventReporter,
    pool: ThreadPool,
}

impl Resolver {
    /// Resolver with the configuration's selectors and the default transport
    pub fn new(config: ResolverConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ResolverConfig) -> ResolverBuilder {
        ResolverBuilder::new(config)
    }

    pub fn local_repository(&self) -> &LocalRepository {
        self.fetcher.local()
    }

    /// Resolve parsed `group:name:version[:kind[:classifier]]` strings
    ///
    /// Fails with `InvalidCoordinate` before any work when a spec is malformed.
    pub fn resolve_specs<S: AsRef<str>>(&self, specs: &[S]) -> Result<ResolutionResult> {
        let roots = specs
            .iter()
            .map(|spec| spec.as_ref().parse())
            .collect::<Result<Vec<Coordinate>>>()?;
        self.resolve(&roots)
    }

    pub fn resolve(&self, roots: &[Coordinate]) -> Result<ResolutionResult> {
        self.resolve_with_cancel(roots, &CancellationToken::new())
    }

    /// Resolve `roots` and their transitive runtime dependencies
    ///
    /// Every reachable winning coordinate appears in the result, either with
    /// its local path or with the reason it could not be resolved.
    pub fn resolve_with_cancel(
        &self,
        roots: &[Coordinate],
        cancel: &CancellationToken,
    ) -> Result<ResolutionResult> {
        info!("Resolving {} root coordinate(s)", roots.len());
        let metadata = MetadataResolver::new(self.fetcher.clone());

        let mut graph = GraphCollector::new(&metadata, &self.pool).collect(roots, cancel)?;
        let conflicts = resolve_conflicts(&mut graph, &self.events);
        debug!(
            "Collected {} node(s), {} conflict(s), {} cycle(s)",
            graph.len(),
            conflicts.len(),
            graph.cycles().count()
        );

        let artifacts = self.materialize(&graph, cancel)?;
        let result = ResolutionResult::new(artifacts, graph, conflicts);
        info!(
            "Resolved {} of {} artifact(s)",
            result.resolved().count(),
            result.len()
        );
        Ok(result)
    }

    /// Fetch every winning node's artifact
    fn materialize(
        &self,
        graph: &DependencyGraph,
        cancel: &CancellationToken,
    ) -> Result<IndexMap<Coordinate, ArtifactOutcome>> {
        let winners: Vec<&GraphNode> = graph.nodes().iter().filter(|node| node.is_winner()).collect();

        let fetcher = &self.fetcher;
        let outcomes: Vec<Result<ArtifactOutcome>> = self.pool.install(|| {
            winners
                .par_iter()
                .map(|node| {
                    if let Some(failure) = &node.failure {
                        return Ok(ArtifactOutcome::Unresolved(failure.clone()));
                    }
                    match fetcher.fetch(&node.coordinate, FetchPurpose::Artifact, cancel) {
                        Ok(path) => Ok(ArtifactOutcome::Resolved(path)),
                        Err(e) if e.is_cancellation() => Err(e),
                        Err(e) => {
                            debug!("{} is unresolved: {}", node.coordinate, e);
                            Ok(ArtifactOutcome::Unresolved(Failure::from(&e)))
                        }
                    }
                })
                .collect()
        });

        let mut artifacts = IndexMap::with_capacity(winners.len());
        for (node, outcome) in winners.iter().zip(outcomes) {
            artifacts.insert(node.coordinate.clone(), outcome?);
        }
        Ok(artifacts)
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("local_repository", &self.fetcher.local().root())
            .field("repositories", &self.fetcher.access().describe())
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

/// Builder for a [`Resolver`] with injected collaborators
///
/// Selectors not set here are built from the configuration's `proxies`,
/// `mirrors` and `servers` tables.
pub struct ResolverBuilder {
    config: ResolverConfig,
    proxy: Option<Arc<dyn ProxySelector>>,
    mirror: Option<Arc<dyn MirrorSelector>>,
    auth: Option<Arc<dyn AuthSelector>>,
    listener: Option<Arc<dyn ResolutionListener>>,
    transport: Option<Arc<dyn Transport>>,
}

impl ResolverBuilder {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            proxy: None,
            mirror: None,
            auth: None,
            listener: None,
            transport: None,
        }
    }

    pub fn proxy_selector(mut self, selector: Arc<dyn ProxySelector>) -> Self {
        self.proxy = Some(selector);
        self
    }

    pub fn mirror_selector(mut self, selector: Arc<dyn MirrorSelector>) -> Self {
        self.mirror = Some(selector);
        self
    }

    pub fn auth_selector(mut self, selector: Arc<dyn AuthSelector>) -> Self {
        self.auth = Some(selector);
        self
    }

    /// Receive resolution events; the default listener drops them
    pub fn listener(mut self, listener: Arc<dyn ResolutionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Replace the HTTP/file transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Resolver> {
        let config = self.config;
        config.validate()?;

        let local = LocalRepository::open(&config.local_repository)?;

        let defaults = Selectors::from_config(&config);
        let selectors = Selectors {
            proxy: self.proxy.unwrap_or(defaults.proxy),
            mirror: self.mirror.unwrap_or(defaults.mirror),
            auth: self.auth.unwrap_or(defaults.auth),
        };
        let access = RepositoryAccess::new(&config.repositories, &selectors, config.offline);
        let policy_override = config.force_refresh.then_some(UpdatePolicy::Always);

        let events = EventReporter::new(self.listener.unwrap_or_else(|| Arc::new(SilentListener)));
        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(DefaultTransport::new(
                config.connect_timeout(),
                config.request_timeout(),
            ))
        });
        let downloader = Downloader::new(transport, config.transfer_retries, events.clone());

        let mut pool = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("artifetch-{i}"));
        if let Some(threads) = config.threads {
            pool = pool.num_threads(threads);
        }
        let pool = pool
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot start worker pool: {e}")))?;

        debug!(
            "Resolver over {} at {} (force refresh: {}, offline: {})",
            access.describe(),
            local.root().display(),
            config.force_refresh,
            config.offline
        );

        let fetcher = ArtifactFetcher::new(local, access, downloader, events.clone(), policy_override);
        Ok(Resolver {
            fetcher: Arc::new(fetcher),
            events,
            pool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteRepository;
    use crate::error::FailureKind;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        remote: TempDir,
        local: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                remote: TempDir::new().unwrap(),
                local: TempDir::new().unwrap(),
            }
        }

        fn resolver(&self) -> Resolver {
            let repo = RemoteRepository::new(
                "fixture",
                url::Url::from_directory_path(self.remote.path()).unwrap().to_string(),
            );
            let config = ResolverConfig::new(self.local.path())
                .with_repositories(vec![repo])
                .with_threads(2);
            Resolver::new(config).unwrap()
        }

        fn publish(&self, coord: &str, deps: &[&str]) {
            let coord: Coordinate = coord.parse().unwrap();
            let deps: String = deps
                .iter()
                .map(|d| {
                    let d: Coordinate = d.parse().unwrap();
                    format!(
                        "<dependency><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version></dependency>",
                        d.group(),
                        d.name(),
                        d.version()
                    )
                })
                .collect();
            let pom = format!(
                "<project><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version>\
                 <dependencies>{deps}</dependencies></project>",
                coord.group(),
                coord.name(),
                coord.version()
            );
            self.write(&coord.descriptor().relative_path(), &pom);
            self.write(&coord.relative_path(), coord.name());
        }

        fn write(&self, relative: &str, body: &str) {
            let path = self.remote.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }
    }

    fn coord(s: &str) -> Coordinate {
        s.parse().unwrap()
    }

    #[test]
    fn test_resolve_transitive_closure() {
        let fx = Fixture::new();
        fx.publish("g:app:1", &["g:lib:1", "g:util:1"]);
        fx.publish("g:lib:1", &["g:util:2", "g:core:1"]);
        fx.publish("g:util:1", &[]);
        fx.publish("g:util:2", &[]);
        fx.publish("g:core:1", &[]);

        let resolver = fx.resolver();
        let result = resolver.resolve(&[coord("g:app:1")]).unwrap();

        let order: Vec<String> = result.coordinates().map(|c| c.to_string()).collect();
        assert_eq!(
            order,
            vec!["g:app:1:jar", "g:lib:1:jar", "g:util:1:jar", "g:core:1:jar"]
        );
        assert!(result.is_complete());
        assert_eq!(result.conflicts().len(), 1);
        let path = result.path(&coord("g:core:1")).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "core");
        assert_eq!(path, resolver.local_repository().path_of(&coord("g:core:1")));
        assert!(path.starts_with(fx.local.path()));
    }

    #[test]
    fn test_missing_descriptor_is_unresolved() {
        let fx = Fixture::new();
        fx.publish("g:good:1", &[]);

        let result = fx
            .resolver()
            .resolve(&[coord("g:good:1"), coord("g:missing:1")])
            .unwrap();
        assert!(result.path(&coord("g:good:1")).is_some());
        let outcome = result.get(&coord("g:missing:1")).unwrap();
        assert_eq!(outcome.failure().unwrap().kind, FailureKind::MetadataUnavailable);
    }

    #[test]
    fn test_resolve_specs_rejects_malformed_input() {
        let fx = Fixture::new();
        let err = fx.resolver().resolve_specs(&["g:a"]).unwrap_err();
        assert!(matches!(err, Error::InvalidCoordinate(_)));
    }

    #[test]
    fn test_cancelled_before_start() {
        let fx = Fixture::new();
        fx.publish("g:a:1", &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fx
            .resolver()
            .resolve_with_cancel(&[coord("g:a:1")], &cancel)
            .unwrap_err();
        assert!(err.is_cancellation());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let local = TempDir::new().unwrap();
        let config = ResolverConfig::new(local.path()).with_threads(0);
        assert!(matches!(Resolver::new(config), Err(Error::InvalidConfig(_))));
    }
}
