// src/repository/selector.rs

//! Proxy, mirror and credential selection
//!
//! The surrounding configuration layer decides which proxy, mirror and
//! credentials apply to a repository. It hands those decisions to the
//! resolver as three selector traits. Table-driven defaults built from
//! [`ResolverConfig`] cover the common settings-file shapes.

use crate::config::{Credentials, MirrorConfig, Proxy, ProxyConfig, RemoteRepository, ResolverConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Chooses the network proxy for a repository
pub trait ProxySelector: Send + Sync {
    fn proxy_for(&self, repository: &RemoteRepository) -> Option<Proxy>;
}

/// Chooses a mirror that replaces a repository
pub trait MirrorSelector: Send + Sync {
    fn mirror_for(&self, repository: &RemoteRepository) -> Option<RemoteRepository>;
}

/// Chooses credentials for a repository
pub trait AuthSelector: Send + Sync {
    fn credentials_for(&self, repository_id: &str) -> Option<Credentials>;
}

/// Proxy selector backed by a list of proxy definitions
///
/// The first proxy whose protocol fits the repository and whose
/// `non_proxy_hosts` do not match the repository host is selected. An `http`
/// proxy also serves `https` repositories (CONNECT tunnelling).
#[derive(Debug, Clone, Default)]
pub struct StaticProxySelector {
    proxies: Vec<ProxyConfig>,
}

impl StaticProxySelector {
    pub fn new(proxies: Vec<ProxyConfig>) -> Self {
        Self { proxies }
    }
}

impl ProxySelector for StaticProxySelector {
    fn proxy_for(&self, repository: &RemoteRepository) -> Option<Proxy> {
        let protocol = repository.protocol();
        if protocol != "http" && protocol != "https" {
            return None;
        }
        let host = repository.host()?;

        self.proxies
            .iter()
            .filter(|entry| {
                entry.proxy.protocol.eq_ignore_ascii_case(&protocol)
                    || entry.proxy.protocol.eq_ignore_ascii_case("http")
            })
            .find(|entry| {
                !entry
                    .non_proxy_hosts
                    .as_deref()
                    .is_some_and(|patterns| matches_non_proxy_host(patterns, &host))
            })
            .map(|entry| entry.proxy.clone())
    }
}

/// Match a host against `|`- or `,`-separated patterns with `*` wildcards
pub fn matches_non_proxy_host(patterns: &str, host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    patterns
        .split(['|', ','])
        .map(|pattern| pattern.trim().to_ascii_lowercase())
        .filter(|pattern| !pattern.is_empty())
        .any(|pattern| wildcard_match(&pattern, &host))
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let Some((first, rest)) = pattern.split_once('*') else {
        return pattern == text;
    };
    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };

    let mut pieces: Vec<&str> = rest.split('*').collect();
    let last = pieces.pop().unwrap_or_default();
    for piece in pieces {
        match remaining.find(piece) {
            Some(idx) => remaining = &remaining[idx + piece.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last)
}

/// Mirror selector driven by `mirror_of` patterns
///
/// Exact id matches win over pattern matches. Pattern syntax:
///
/// - `*` matches every repository
/// - `external:*` matches repositories not on this machine
/// - `a,b` matches either id
/// - `!a` excludes an id from an otherwise matching pattern
#[derive(Debug, Clone, Default)]
pub struct PatternMirrorSelector {
    mirrors: Vec<MirrorConfig>,
}

impl PatternMirrorSelector {
    pub fn new(mirrors: Vec<MirrorConfig>) -> Self {
        Self { mirrors }
    }
}

impl MirrorSelector for PatternMirrorSelector {
    fn mirror_for(&self, repository: &RemoteRepository) -> Option<RemoteRepository> {
        let selected = self
            .mirrors
            .iter()
            .find(|mirror| mirror.mirror_of.split(',').any(|id| id.trim() == repository.id))
            .or_else(|| {
                self.mirrors
                    .iter()
                    .find(|mirror| matches_mirror_pattern(&mirror.mirror_of, repository))
            })?;

        debug!("Repository {} is mirrored by {}", repository.id, selected.id);
        Some(RemoteRepository::new(selected.id.clone(), selected.url.clone()).with_policy(selected.policy))
    }
}

/// Whether a `mirror_of` pattern covers a repository
pub fn matches_mirror_pattern(pattern: &str, repository: &RemoteRepository) -> bool {
    let mut result = false;
    for entry in pattern.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if let Some(negated) = entry.strip_prefix('!') {
            if negated == repository.id {
                return false;
            }
            continue;
        }
        match entry {
            "*" => result = true,
            "external:*" if repository.is_external() => result = true,
            id if id == repository.id => result = true,
            _ => {}
        }
    }
    result
}

/// Credential selector keyed by repository id
#[derive(Debug, Clone, Default)]
pub struct StaticAuthSelector {
    servers: HashMap<String, Credentials>,
}

impl StaticAuthSelector {
    pub fn new(servers: impl IntoIterator<Item = (String, Credentials)>) -> Self {
        Self {
            servers: servers.into_iter().collect(),
        }
    }
}

impl AuthSelector for StaticAuthSelector {
    fn credentials_for(&self, repository_id: &str) -> Option<Credentials> {
        self.servers.get(repository_id).cloned()
    }
}

/// The three selectors consulted for every repository
#[derive(Clone)]
pub struct Selectors {
    pub proxy: Arc<dyn ProxySelector>,
    pub mirror: Arc<dyn MirrorSelector>,
    pub auth: Arc<dyn AuthSelector>,
}

impl Selectors {
    /// Table-driven selectors from the configuration's optional tables
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            proxy: Arc::new(StaticProxySelector::new(config.proxies.clone())),
            mirror: Arc::new(PatternMirrorSelector::new(config.mirrors.clone())),
            auth: Arc::new(StaticAuthSelector::new(
                config
                    .servers
                    .iter()
                    .map(|server| (server.id.clone(), server.credentials.clone())),
            )),
        }
    }
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            proxy: Arc::new(StaticProxySelector::default()),
            mirror: Arc::new(PatternMirrorSelector::default()),
            auth: Arc::new(StaticAuthSelector::default()),
        }
    }
}

impl std::fmt::Debug for Selectors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selectors").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryPolicy;

    fn mirror(id: &str, mirror_of: &str) -> MirrorConfig {
        MirrorConfig {
            id: id.to_string(),
            url: format!("https://{id}.example.com/maven"),
            mirror_of: mirror_of.to_string(),
            policy: RepositoryPolicy::default(),
        }
    }

    #[test]
    fn test_non_proxy_hosts() {
        assert!(matches_non_proxy_host("localhost|*.example.com", "repo.example.com"));
        assert!(matches_non_proxy_host("localhost|*.example.com", "LOCALHOST"));
        assert!(!matches_non_proxy_host("localhost|*.example.com", "example.org"));
        assert!(matches_non_proxy_host("10.*.1", "10.0.0.1"));
        assert!(!matches_non_proxy_host("", "anything"));
    }

    #[test]
    fn test_proxy_selection() {
        let selector = StaticProxySelector::new(vec![ProxyConfig {
            proxy: Proxy::new("http", "proxy.corp", 3128),
            non_proxy_hosts: Some("*.corp".to_string()),
        }]);

        let central = RemoteRepository::central();
        assert_eq!(selector.proxy_for(&central).unwrap().host, "proxy.corp");

        let internal = RemoteRepository::new("internal", "https://nexus.corp/repo");
        assert!(selector.proxy_for(&internal).is_none());

        let local = RemoteRepository::new("local", "file:///srv/repo");
        assert!(selector.proxy_for(&local).is_none());
    }

    #[test]
    fn test_mirror_patterns() {
        let central = RemoteRepository::central();
        let local = RemoteRepository::new("staging", "http://localhost:8081/repo");

        assert!(matches_mirror_pattern("*", &central));
        assert!(matches_mirror_pattern("external:*", &central));
        assert!(!matches_mirror_pattern("external:*", &local));
        assert!(matches_mirror_pattern("staging,central", &local));
        assert!(!matches_mirror_pattern("*,!central", &central));
        assert!(matches_mirror_pattern("*,!central", &local));
    }

    #[test]
    fn test_exact_id_beats_wildcard() {
        let selector = PatternMirrorSelector::new(vec![mirror("all", "*"), mirror("only-central", "central")]);
        let selected = selector.mirror_for(&RemoteRepository::central()).unwrap();
        assert_eq!(selected.id, "only-central");
        assert_eq!(selected.url, "https://only-central.example.com/maven");
    }

    #[test]
    fn test_auth_by_id() {
        let selector = StaticAuthSelector::new(vec![(
            "internal".to_string(),
            Credentials::Basic {
                username: "u".to_string(),
                password: "p".to_string(),
            },
        )]);
        assert!(selector.credentials_for("internal").is_some());
        assert!(selector.credentials_for("central").is_none());
    }
}
