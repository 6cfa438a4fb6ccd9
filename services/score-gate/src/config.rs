//! Type-Safe Configuration with Validation
//!
//! All configuration is loaded from environment variables and validated at
//! startup. Key material is deliberately absent here: it is read only through
//! the key resolver so that it never lands in a `Debug` dump of `Config`.

use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Upper bound on the capability token lifetime.
pub const MAX_TOKEN_TTL_SECONDS: u64 = 30;

/// Capability string carried by every issued token.
pub const SCORE_SCOPE: &str = "score:single";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid origin in {field}: {reason}")]
    InvalidOrigin {
        /// Variable holding the bad value
        field: String,
        /// Parser message
        reason: String,
    },

    /// Invalid port number
    #[error("Invalid port: must be between 1 and 65535")]
    InvalidPort,

    /// Token TTL outside the accepted range
    #[error("Invalid TTL: must be between 1 and {MAX_TOKEN_TTL_SECONDS} seconds")]
    InvalidTtl,

    /// A rate window or limit of zero
    #[error("Invalid rate limit for {0}: window and limit must be greater than 0")]
    InvalidRateLimit(&'static str),

    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },
}

/// Window and cap for one rate-limited subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    /// Window length
    pub window: Duration,
    /// Requests admitted per window
    pub limit: u32,
}

impl RatePolicy {
    /// Creates a policy from whole seconds.
    #[must_use]
    pub const fn per_seconds(limit: u32, window_secs: u64) -> Self {
        Self {
            window: Duration::from_secs(window_secs),
            limit,
        }
    }
}

/// Whether requests without a capability token get canned demo data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DemoMode {
    /// Tokenless requests are rejected.
    #[default]
    Disabled,
    /// Tokenless or demo-tagged requests get a labelled canned response.
    Enabled,
}

/// Service configuration with validation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port (1-65535)
    pub port: u16,
    /// `iss` claim written by the issuer and required by the verifier
    pub token_issuer: String,
    /// `aud` claim written by the issuer and required by the verifier
    pub token_audience: String,
    /// Token lifetime in seconds (1..=30)
    pub token_ttl_seconds: u64,
    /// Cap on issuance per PII hash
    pub pii_rate: RatePolicy,
    /// Cap on issuance per requester hash
    pub requester_rate: RatePolicy,
    /// Period of the nonce and rate-window sweep
    pub sweep_interval_seconds: u64,
    /// Origins allowed to call the endpoints from a browser
    pub cors_allowed_origins: Vec<String>,
    /// Preflight cache duration
    pub cors_max_age_seconds: u64,
    /// Demo response mode
    pub demo_mode: DemoMode,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Default log filter
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            token_issuer: "score-token-issuer".to_string(),
            token_audience: "score-check".to_string(),
            token_ttl_seconds: MAX_TOKEN_TTL_SECONDS,
            pii_rate: RatePolicy::per_seconds(1, 60),
            requester_rate: RatePolicy::per_seconds(10, 3600),
            sweep_interval_seconds: 60,
            cors_allowed_origins: Vec::new(),
            cors_max_age_seconds: 600,
            demo_mode: DemoMode::Disabled,
            shutdown_timeout_seconds: 30,
            log_level: "info".to_string(),
            log_json: true,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables with validation.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable fails to parse or validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_env("PORT", defaults.port)?,
            token_issuer: env::var("TOKEN_ISSUER").unwrap_or(defaults.token_issuer),
            token_audience: env::var("TOKEN_AUDIENCE").unwrap_or(defaults.token_audience),
            token_ttl_seconds: parse_env("TOKEN_TTL_SECONDS", defaults.token_ttl_seconds)?,
            pii_rate: RatePolicy::per_seconds(
                parse_env("PII_RATE_LIMIT", defaults.pii_rate.limit)?,
                parse_env("PII_RATE_WINDOW_SECONDS", defaults.pii_rate.window.as_secs())?,
            ),
            requester_rate: RatePolicy::per_seconds(
                parse_env("REQUESTER_RATE_LIMIT", defaults.requester_rate.limit)?,
                parse_env(
                    "REQUESTER_RATE_WINDOW_SECONDS",
                    defaults.requester_rate.window.as_secs(),
                )?,
            ),
            sweep_interval_seconds: parse_env(
                "NONCE_SWEEP_INTERVAL_SECONDS",
                defaults.sweep_interval_seconds,
            )?,
            cors_allowed_origins: parse_origins_env("CORS_ALLOWED_ORIGINS")?,
            cors_max_age_seconds: parse_env("CORS_MAX_AGE_SECONDS", defaults.cors_max_age_seconds)?,
            demo_mode: if parse_env("DEMO_MODE_ENABLED", false)? {
                DemoMode::Enabled
            } else {
                DemoMode::Disabled
            },
            shutdown_timeout_seconds: parse_env(
                "SHUTDOWN_TIMEOUT",
                defaults.shutdown_timeout_seconds,
            )?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: parse_env("LOG_JSON", defaults.log_json)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.token_ttl_seconds == 0 || self.token_ttl_seconds > MAX_TOKEN_TTL_SECONDS {
            return Err(ConfigError::InvalidTtl);
        }
        if self.pii_rate.limit == 0 || self.pii_rate.window.is_zero() {
            return Err(ConfigError::InvalidRateLimit("pii"));
        }
        if self.requester_rate.limit == 0 || self.requester_rate.window.is_zero() {
            return Err(ConfigError::InvalidRateLimit("requester"));
        }
        if self.token_issuer.is_empty() {
            return Err(ConfigError::MissingRequired("token_issuer".to_string()));
        }
        if self.token_audience.is_empty() {
            return Err(ConfigError::MissingRequired("token_audience".to_string()));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(ConfigError::ParseError {
                name: "NONCE_SWEEP_INTERVAL_SECONDS".to_string(),
                reason: "interval must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Token lifetime as a `Duration`.
    #[must_use]
    pub const fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds)
    }

    /// Sweep period as a `Duration`.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Bind address string.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse an environment variable with a default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated list of origins, normalised to `scheme://host[:port]`.
fn parse_origins_env(name: &str) -> Result<Vec<String>, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_origins(name, &raw),
        Err(_) => Ok(Vec::new()),
    }
}

fn parse_origins(name: &str, raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let url = Url::parse(s).map_err(|e| ConfigError::InvalidOrigin {
                field: name.to_string(),
                reason: e.to_string(),
            })?;
            if url.host_str().is_none() {
                return Err(ConfigError::InvalidOrigin {
                    field: name.to_string(),
                    reason: format!("{s} has no host"),
                });
            }
            Ok(url.origin().ascii_serialization())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.token_ttl(), Duration::from_secs(30));
        assert_eq!(config.pii_rate, RatePolicy::per_seconds(1, 60));
        assert_eq!(config.requester_rate, RatePolicy::per_seconds(10, 3600));
        assert_eq!(config.demo_mode, DemoMode::Disabled);
    }

    #[test]
    fn test_config_validation_invalid_port() {
        let config = Config {
            port: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPort)));
    }

    #[test]
    fn test_config_validation_ttl_above_cap() {
        let config = Config {
            token_ttl_seconds: 31,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTtl)));
    }

    #[test]
    fn test_config_validation_zero_ttl() {
        let config = Config {
            token_ttl_seconds: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTtl)));
    }

    #[test]
    fn test_config_validation_zero_rate_limit() {
        let config = Config {
            pii_rate: RatePolicy::per_seconds(0, 60),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRateLimit("pii"))
        ));
    }

    #[test]
    fn test_config_validation_empty_audience() {
        let config = Config {
            token_audience: String::new(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_parse_origins_normalises() {
        let origins = parse_origins(
            "CORS_ALLOWED_ORIGINS",
            "https://app.example.com/, http://localhost:3000 ,",
        )
        .unwrap();
        assert_eq!(
            origins,
            vec!["https://app.example.com", "http://localhost:3000"]
        );
    }

    #[test]
    fn test_parse_origins_invalid() {
        let result = parse_origins("CORS_ALLOWED_ORIGINS", "not a url");
        assert!(matches!(result, Err(ConfigError::InvalidOrigin { .. })));
    }
}
