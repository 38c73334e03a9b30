//! Client configuration.

use std::{fmt, num::NonZeroUsize, time::Duration};

use thiserror::Error;
use url::Url;

/// Default number of sessions a pool may hold open.
pub const DEFAULT_POOL_SIZE: usize = 80;

/// Default time a caller waits for a free session.
pub const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default lifetime of a remote session before it is renewed.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(600);

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("pool size must be at least 1")]
    InvalidPoolSize,
    #[error("session TTL must be greater than zero")]
    InvalidSessionTtl,
    #[error("missing setting: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

/// Login material for the remote endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings for a client and the session pool behind it.
///
/// The value is handed to the client at construction time. Only the
/// `enabled` switch can change afterwards, through the client itself.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote endpoint address.
    pub endpoint: Url,
    /// Login material.
    pub credentials: Credentials,
    /// Maximum number of sessions open at once.
    pub pool_size: NonZeroUsize,
    /// Sessions older than this are logged out and replaced at checkout.
    pub session_ttl: Duration,
    /// How long a call waits for a free session.
    pub checkout_timeout: Duration,
    /// Request timeout handed to network transports.
    pub request_timeout: Duration,
    /// Global switch; a disabled client never touches the network.
    pub enabled: bool,
}

impl ClientConfig {
    /// Create a configuration with default pool settings.
    #[must_use]
    pub fn new(endpoint: Url, credentials: Credentials) -> Self {
        Self {
            endpoint,
            credentials,
            pool_size: NonZeroUsize::new(DEFAULT_POOL_SIZE).unwrap_or(NonZeroUsize::MIN),
            session_ttl: DEFAULT_SESSION_TTL,
            checkout_timeout: DEFAULT_CHECKOUT_TIMEOUT,
            request_timeout: Duration::from_secs(60),
            enabled: true,
        }
    }

    /// Set the pool size.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidPoolSize` for zero.
    pub fn with_pool_size(mut self, size: usize) -> Result<Self, ConfigError> {
        self.pool_size = NonZeroUsize::new(size).ok_or(ConfigError::InvalidPoolSize)?;
        Ok(self)
    }

    /// Set the session TTL.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidSessionTtl` for a zero duration.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Result<Self, ConfigError> {
        if ttl.is_zero() {
            return Err(ConfigError::InvalidSessionTtl);
        }
        self.session_ttl = ttl;
        Ok(self)
    }

    #[must_use]
    pub const fn with_checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Apply a one-shot update and re-check the invariants.
    ///
    /// # Errors
    /// Returns an error if the updated settings are invalid.
    pub fn configure<F>(mut self, mutator: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = Settings {
            endpoint: self.endpoint.clone(),
            credentials: self.credentials.clone(),
            pool_size: self.pool_size.get(),
            session_ttl: self.session_ttl,
            checkout_timeout: self.checkout_timeout,
            request_timeout: self.request_timeout,
            enabled: self.enabled,
        };
        mutator(&mut settings);

        if settings.session_ttl.is_zero() {
            return Err(ConfigError::InvalidSessionTtl);
        }
        self.pool_size =
            NonZeroUsize::new(settings.pool_size).ok_or(ConfigError::InvalidPoolSize)?;
        self.endpoint = settings.endpoint;
        self.credentials = settings.credentials;
        self.session_ttl = settings.session_ttl;
        self.checkout_timeout = settings.checkout_timeout;
        self.request_timeout = settings.request_timeout;
        self.enabled = settings.enabled;
        Ok(self)
    }

    /// Whether calls should reach the network at all.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Load settings from `LISTMEMBER_*` environment variables.
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup.
    ///
    /// Required: `LISTMEMBER_ENDPOINT`, `LISTMEMBER_USERNAME`,
    /// `LISTMEMBER_PASSWORD`. Everything else falls back to defaults.
    ///
    /// # Errors
    /// Returns an error if a required key is missing or a value is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let endpoint = Url::parse(&require("LISTMEMBER_ENDPOINT")?)?;
        let credentials = Credentials::new(
            require("LISTMEMBER_USERNAME")?,
            require("LISTMEMBER_PASSWORD")?,
        );
        let mut config = Self::new(endpoint, credentials);

        if let Some(size) = parse_var::<usize>(&lookup, "LISTMEMBER_POOL_SIZE")? {
            config = config.with_pool_size(size)?;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "LISTMEMBER_SESSION_TTL_SECS")? {
            config = config.with_session_ttl(Duration::from_secs(secs))?;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "LISTMEMBER_CHECKOUT_TIMEOUT_SECS")? {
            config.checkout_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "LISTMEMBER_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("LISTMEMBER_ENABLED") {
            config.enabled = parse_bool(&raw).ok_or(ConfigError::InvalidValue {
                key: "LISTMEMBER_ENABLED",
                value: raw,
            })?;
        }

        Ok(config)
    }
}

/// Mutable view handed to [`ClientConfig::configure`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: Url,
    pub credentials: Credentials,
    pub pool_size: usize,
    pub session_ttl: Duration,
    pub checkout_timeout: Duration,
    pub request_timeout: Duration,
    pub enabled: bool,
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key, value: raw })
        })
        .transpose()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base() -> ClientConfig {
        ClientConfig::new(
            Url::parse("https://api.example.test/rpc").unwrap(),
            Credentials::new("user", "secret"),
        )
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = base();
        assert_eq!(config.pool_size.get(), DEFAULT_POOL_SIZE);
        assert_eq!(config.checkout_timeout, DEFAULT_CHECKOUT_TIMEOUT);
        assert!(config.enabled());
    }

    #[test]
    fn test_zero_session_ttl_rejected() {
        assert!(matches!(
            base().with_session_ttl(Duration::ZERO),
            Err(ConfigError::InvalidSessionTtl)
        ));
        assert!(matches!(
            base().configure(|s| s.session_ttl = Duration::ZERO),
            Err(ConfigError::InvalidSessionTtl)
        ));
        let config = base().with_session_ttl(Duration::from_secs(5)).unwrap();
        assert_eq!(config.session_ttl, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        assert!(matches!(
            base().with_pool_size(0),
            Err(ConfigError::InvalidPoolSize)
        ));
        assert!(matches!(
            base().configure(|s| s.pool_size = 0),
            Err(ConfigError::InvalidPoolSize)
        ));
    }

    #[test]
    fn test_configure_applies_update() {
        let config = base()
            .configure(|s| {
                s.pool_size = 4;
                s.enabled = false;
            })
            .unwrap();
        assert_eq!(config.pool_size.get(), 4);
        assert!(!config.enabled());
    }

    #[test]
    fn test_password_redacted() {
        let printed = format!("{:?}", Credentials::new("user", "hunter2"));
        assert!(printed.contains("user"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("LISTMEMBER_ENDPOINT", "https://api.example.test/rpc"),
            ("LISTMEMBER_USERNAME", "user"),
            ("LISTMEMBER_PASSWORD", "secret"),
            ("LISTMEMBER_POOL_SIZE", "3"),
            ("LISTMEMBER_SESSION_TTL_SECS", "120"),
            ("LISTMEMBER_ENABLED", "off"),
        ]))
        .unwrap();
        assert_eq!(config.pool_size.get(), 3);
        assert_eq!(config.session_ttl, Duration::from_secs(120));
        assert!(!config.enabled);
    }

    #[test]
    fn test_from_lookup_missing_and_malformed() {
        let err = ClientConfig::from_lookup(lookup_from(&[(
            "LISTMEMBER_ENDPOINT",
            "https://api.example.test",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("LISTMEMBER_USERNAME")));

        let err = ClientConfig::from_lookup(lookup_from(&[
            ("LISTMEMBER_ENDPOINT", "https://api.example.test"),
            ("LISTMEMBER_USERNAME", "user"),
            ("LISTMEMBER_PASSWORD", "secret"),
            ("LISTMEMBER_POOL_SIZE", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "LISTMEMBER_POOL_SIZE",
                ..
            }
        ));
    }
}
