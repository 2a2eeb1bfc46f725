// src/config.rs

//! Resolver configuration
//!
//! Everything the resolver needs from its surroundings is passed in as a
//! [`ResolverConfig`] value: the local repository root, the ordered list of
//! remote repositories, process-level flags and transfer timeouts. The
//! optional `proxies`, `mirrors` and `servers` tables seed the default
//! selectors when the caller does not inject its own.
//!
//! # Example
//!
//! ```toml
//! local_repository = "/home/me/.m2/repository"
//! offline = false
//! force_refresh = false
//! connect_timeout_ms = 5000
//!
//! [[repositories]]
//! id = "central"
//! url = "https://repo1.maven.org/maven2/"
//! checksum = "warn"
//! update = "never"
//!
//! [[mirrors]]
//! id = "corp"
//! url = "https://nexus.corp.example/repository/maven-public/"
//! mirror_of = "external:*"
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use strum_macros::{Display, EnumString};
use url::Url;

/// Maven Central, the repository used when none is configured
pub const MAVEN_CENTRAL_URL: &str = "https://repo1.maven.org/maven2/";

/// Default connect timeout (10 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default total request timeout (30 minutes, large artifacts included)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default number of retries against the same repository on transient failure
pub const DEFAULT_TRANSFER_RETRIES: u32 = 1;

/// What to do when a checksum sidecar is missing or does not match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    #[default]
    Warn,
    Fail,
    Ignore,
}

/// How often cached mutable (snapshot) content is revalidated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum UpdatePolicy {
    /// Cached content is used no matter how old it is
    #[default]
    Never,
    /// Cached content is revalidated on every request
    Always,
    /// Revalidate once per day
    Daily,
    /// Revalidate when older than the given number of minutes
    Interval(u64),
}

impl UpdatePolicy {
    /// Maximum age of cached content, `None` meaning unbounded
    pub fn max_age(&self) -> Option<Duration> {
        match self {
            UpdatePolicy::Never => None,
            UpdatePolicy::Always => Some(Duration::ZERO),
            UpdatePolicy::Daily => Some(Duration::from_secs(24 * 60 * 60)),
            UpdatePolicy::Interval(minutes) => Some(Duration::from_secs(minutes * 60)),
        }
    }

    /// Whether content of the given age must be refetched
    pub fn is_stale(&self, age: Duration) -> bool {
        match self.max_age() {
            None => false,
            Some(max) if max.is_zero() => true,
            Some(max) => age >= max,
        }
    }

    /// The policy that revalidates most often
    pub fn most_frequent(policies: impl IntoIterator<Item = UpdatePolicy>) -> UpdatePolicy {
        policies
            .into_iter()
            .min_by_key(|policy| policy.max_age().unwrap_or(Duration::MAX))
            .unwrap_or_default()
    }
}

impl FromStr for UpdatePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(UpdatePolicy::Never),
            "always" => Ok(UpdatePolicy::Always),
            "daily" => Ok(UpdatePolicy::Daily),
            other => other
                .strip_prefix("interval:")
                .and_then(|minutes| minutes.parse().ok())
                .map(UpdatePolicy::Interval)
                .ok_or_else(|| Error::InvalidConfig(format!("unknown update policy '{s}'"))),
        }
    }
}

impl TryFrom<String> for UpdatePolicy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePolicy::Never => write!(f, "never"),
            UpdatePolicy::Always => write!(f, "always"),
            UpdatePolicy::Daily => write!(f, "daily"),
            UpdatePolicy::Interval(minutes) => write!(f, "interval:{}", minutes),
        }
    }
}

/// Per-repository checksum and update behavior
///
/// `update` governs snapshot files fetched from this repository only;
/// `force_refresh` overrides it for every repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct RepositoryPolicy {
    #[serde(default)]
    pub checksum: ChecksumPolicy,
    #[serde(default)]
    pub update: UpdatePolicy,
}

/// Credentials for a repository or proxy
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Credentials {
    Basic {
        username: String,
        password: String,
    },
    Key {
        private_key: PathBuf,
        #[serde(default)]
        passphrase: Option<String>,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Key { private_key, .. } => f
                .debug_struct("Key")
                .field("private_key", private_key)
                .field("passphrase", &"<redacted>")
                .finish(),
        }
    }
}

/// A network proxy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Proxy {
    #[serde(default = "default_proxy_protocol")]
    pub protocol: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_proxy_protocol() -> String {
    "http".to_string()
}

impl Proxy {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Proxy URL understood by the HTTP client
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// A remote repository endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteRepository {
    pub id: String,
    pub url: String,
    #[serde(flatten)]
    pub policy: RepositoryPolicy,
    #[serde(default)]
    pub proxy: Option<Proxy>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl RemoteRepository {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            policy: RepositoryPolicy::default(),
            proxy: None,
            credentials: None,
        }
    }

    /// Maven Central with the update=never, checksum=warn policy
    pub fn central() -> Self {
        Self::new("central", MAVEN_CENTRAL_URL)
    }

    /// Build a repository from `"central"` or a bare URL
    ///
    /// URL repositories get an id derived from their host and path.
    pub fn from_spec(spec: &str) -> Self {
        if spec == "central" {
            return Self::central();
        }
        let id: String = spec
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(spec)
            .trim_end_matches('/')
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '-' })
            .collect();
        Self::new(id, spec)
    }

    pub fn with_policy(mut self, policy: RepositoryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Base URL guaranteed to end with a slash
    pub fn base_url(&self) -> String {
        if self.url.ends_with('/') {
            self.url.clone()
        } else {
            format!("{}/", self.url)
        }
    }

    /// Host of the repository URL, if it has one
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }

    /// URL scheme (`https`, `http`, `file`, ...)
    pub fn protocol(&self) -> String {
        Url::parse(&self.url)
            .map(|url| url.scheme().to_string())
            .unwrap_or_default()
    }

    /// Whether the repository lives outside this machine
    pub fn is_external(&self) -> bool {
        match self.host() {
            Some(host) => self.protocol() != "file" && host != "localhost" && host != "127.0.0.1",
            None => false,
        }
    }
}

/// Proxy entry for the default proxy selector
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(flatten)]
    pub proxy: Proxy,
    /// `|`-separated host patterns that bypass the proxy (`localhost|*.corp`)
    #[serde(default)]
    pub non_proxy_hosts: Option<String>,
}

/// Mirror entry for the default mirror selector
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    pub id: String,
    pub url: String,
    /// Which repositories this mirror replaces (`*`, `external:*`, `a,b`, `!c`)
    pub mirror_of: String,
    #[serde(flatten)]
    pub policy: RepositoryPolicy,
}

/// Credentials entry for the default auth selector
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub id: String,
    #[serde(flatten)]
    pub credentials: Credentials,
}

/// Complete resolver configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Local cache root, created if absent
    pub local_repository: PathBuf,
    /// Remote repositories in lookup order
    #[serde(default = "default_repositories")]
    pub repositories: Vec<RemoteRepository>,
    #[serde(default)]
    pub offline: bool,
    /// Revalidate every mutable cached entry (update policy "always")
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default = "default_transfer_retries")]
    pub transfer_retries: u32,
    /// Worker threads for fetches and downloads
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub proxies: Vec<ProxyConfig>,
    #[serde(default)]
    pub mirrors: Vec<MirrorConfig>,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

fn default_repositories() -> Vec<RemoteRepository> {
    vec![RemoteRepository::central()]
}

fn default_transfer_retries() -> u32 {
    DEFAULT_TRANSFER_RETRIES
}

impl ResolverConfig {
    /// Configuration with Maven Central and default settings
    pub fn new(local_repository: impl Into<PathBuf>) -> Self {
        Self {
            local_repository: local_repository.into(),
            repositories: default_repositories(),
            offline: false,
            force_refresh: false,
            connect_timeout_ms: None,
            request_timeout_ms: None,
            transfer_retries: DEFAULT_TRANSFER_RETRIES,
            threads: None,
            proxies: Vec::new(),
            mirrors: Vec::new(),
            servers: Vec::new(),
        }
    }

    /// Parse configuration from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn with_repositories(mut self, repositories: Vec<RemoteRepository>) -> Self {
        self.repositories = repositories;
        self
    }

    /// Replace the repository list with `"central"` / URL specs
    pub fn with_repository_specs<S: AsRef<str>>(mut self, specs: &[S]) -> Self {
        self.repositories = specs
            .iter()
            .map(|spec| RemoteRepository::from_spec(spec.as_ref()))
            .collect();
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout_ms = Some(connect.as_millis() as u64);
        self.request_timeout_ms = Some(request.as_millis() as u64);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Update policy for cached mutable content whose repository is unknown
    ///
    /// Content with a recorded origin follows that repository's own policy.
    pub fn update_policy(&self) -> UpdatePolicy {
        if self.force_refresh {
            UpdatePolicy::Always
        } else {
            UpdatePolicy::most_frequent(self.repositories.iter().map(|repo| repo.policy.update))
        }
    }

    /// Check ids and URLs before anything touches the network
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for repo in &self.repositories {
            if repo.id.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "repository {} has an empty id",
                    repo.url
                )));
            }
            if !seen.insert(repo.id.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate repository id '{}'",
                    repo.id
                )));
            }
            Url::parse(&repo.url).map_err(|e| {
                Error::InvalidConfig(format!("repository '{}' has invalid URL: {e}", repo.id))
            })?;
        }
        for mirror in &self.mirrors {
            Url::parse(&mirror.url).map_err(|e| {
                Error::InvalidConfig(format!("mirror '{}' has invalid URL: {e}", mirror.id))
            })?;
        }
        if self.threads == Some(0) {
            return Err(Error::InvalidConfig("threads must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::new("/tmp/repo");
        assert_eq!(config.repositories, vec![RemoteRepository::central()]);
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.transfer_retries, 1);
        assert_eq!(config.update_policy(), UpdatePolicy::Never);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_force_refresh_means_always() {
        let config = ResolverConfig::new("/tmp/repo").with_force_refresh(true);
        assert_eq!(config.update_policy(), UpdatePolicy::Always);
    }

    #[test]
    fn test_parse_toml() {
        let config = ResolverConfig::from_toml_str(
            r#"
            local_repository = "/var/cache/artifacts"
            offline = true
            connect_timeout_ms = 2500

            [[repositories]]
            id = "internal"
            url = "https://repo.example.com/maven"
            checksum = "fail"
            update = "interval:30"

            [repositories.credentials]
            username = "deploy"
            password = "secret"

            [[repositories]]
            id = "central"
            url = "https://repo1.maven.org/maven2/"

            [[mirrors]]
            id = "corp"
            url = "https://nexus.example.com/public"
            mirror_of = "external:*"

            [[proxies]]
            host = "proxy.example.com"
            port = 3128
            non_proxy_hosts = "localhost|*.example.com"
            "#,
        )
        .unwrap();

        assert!(config.offline);
        assert_eq!(config.connect_timeout(), Duration::from_millis(2500));
        assert_eq!(config.repositories.len(), 2);

        let internal = &config.repositories[0];
        assert_eq!(internal.policy.checksum, ChecksumPolicy::Fail);
        assert_eq!(internal.policy.update, UpdatePolicy::Interval(30));
        assert!(matches!(
            internal.credentials,
            Some(Credentials::Basic { ref username, .. }) if username == "deploy"
        ));
        assert_eq!(config.update_policy(), UpdatePolicy::Interval(30));

        assert_eq!(config.mirrors[0].mirror_of, "external:*");
        assert_eq!(config.proxies[0].proxy.protocol, "http");
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let config = ResolverConfig::new("/tmp/repo").with_repositories(vec![
            RemoteRepository::new("a", "https://one.example.com/"),
            RemoteRepository::new("a", "https://two.example.com/"),
        ]);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_update_policy_parsing() {
        assert_eq!("daily".parse::<UpdatePolicy>().unwrap(), UpdatePolicy::Daily);
        assert_eq!("interval:5".parse::<UpdatePolicy>().unwrap(), UpdatePolicy::Interval(5));
        assert!("sometimes".parse::<UpdatePolicy>().is_err());

        assert!(UpdatePolicy::Always.is_stale(Duration::ZERO));
        assert!(!UpdatePolicy::Never.is_stale(Duration::from_secs(1_000_000)));
        assert!(UpdatePolicy::Interval(1).is_stale(Duration::from_secs(61)));
        assert!(!UpdatePolicy::Interval(1).is_stale(Duration::from_secs(59)));

        let frequent = UpdatePolicy::most_frequent([
            UpdatePolicy::Never,
            UpdatePolicy::Daily,
            UpdatePolicy::Interval(10),
        ]);
        assert_eq!(frequent, UpdatePolicy::Interval(10));
    }

    #[test]
    fn test_repository_from_spec() {
        assert_eq!(RemoteRepository::from_spec("central"), RemoteRepository::central());

        let repo = RemoteRepository::from_spec("https://repo.example.com/maven2/");
        assert_eq!(repo.id, "repo.example.com-maven2");
        assert_eq!(repo.base_url(), "https://repo.example.com/maven2/");
        assert!(repo.is_external());

        let local = RemoteRepository::from_spec("file:///srv/repo");
        assert!(!local.is_external());
    }
}
