use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_USER_AGENT: &str =
    concat!("clinic-api-client/", env!("CARGO_PKG_VERSION"));

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base url `{input}`: {reason}")]
    InvalidBaseUrl { input: String, reason: String },
}

/// Named options consumed by the client core. Nothing here is hard-coded in
/// the dispatcher.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin including any path prefix, e.g.
    /// `https://api.example.com/api/v1`.
    pub base_url: String,

    /// Overall per-request deadline, enforced by the transport.
    pub timeout: Duration,

    /// Maximum age of a memoized GET response.
    pub cache_ttl: Duration,

    /// Lifetime stamped on a newly stored access token.
    pub access_token_ttl: Duration,

    /// Lifetime stamped on a newly stored refresh token.
    pub refresh_token_ttl: Duration,

    pub user_agent: String,

    /// Where the credential pair is persisted across restarts. `None` keeps
    /// credentials in memory only.
    pub credentials_path: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            credentials_path: None,
        }
    }

    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(base_url)
    }

    /// Absolute URL for an endpoint path relative to the configured base.
    pub(crate) fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(base_url),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    pub fn access_token_ttl(mut self, ttl: Duration) -> Self {
        self.config.access_token_ttl = ttl;
        self
    }

    pub fn refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.config.refresh_token_ttl = ttl;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.credentials_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        if let Err(err) = Url::parse(&self.config.base_url) {
            return Err(ConfigError::InvalidBaseUrl {
                input: self.config.base_url,
                reason: err.to_string(),
            });
        }
        Ok(self.config)
    }
}
