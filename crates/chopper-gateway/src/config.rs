//! Gateway configuration
//!
//! Loaded with the `config` crate from a TOML, YAML or JSON file, with
//! `CHOPPER_`-prefixed environment variables layered on top. Nested keys
//! use `__`, so `CHOPPER_TOKEN__SECRET` sets `token.secret` and
//! `CHOPPER_ADMISSION__BURST` sets `admission.burst`.
//!
//! ```toml
//! [token]
//! secret = "change-me-to-32-bytes-or-more...."
//! issuer = "chopper"
//! audience = "chopper-web"
//! expiration_secs = 3600
//!
//! [admission]
//! refill_interval_ms = 1000
//! burst = 5
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};

use crate::admission::{AdmissionController, BucketPolicy};
use crate::error::ConfigError;

/// Default environment variable prefix
pub const ENV_PREFIX: &str = "CHOPPER";

/// Complete gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Token authority settings
    pub token: TokenConfig,
    /// Admission control settings
    #[serde(default)]
    pub admission: AdmissionConfig,
}

/// Token authority settings
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// HMAC signing secret
    pub secret: SecretString,
    /// Issuer written into and required of every token
    pub issuer: String,
    /// Audience written into and required of every token
    pub audience: String,
    /// Token lifetime
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "expiration_secs", default = "default_expiration")]
    pub expiration: Duration,
}

/// Admission control settings
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdmissionConfig {
    /// Time for one token to accrue
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "refill_interval_ms", default = "default_refill_interval")]
    pub refill_interval: Duration,
    /// Bucket capacity
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Idle time after which a client's bucket is evicted
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "idle_ttl_secs", default = "default_idle_ttl")]
    pub idle_ttl: Duration,
    /// Minimum spacing between opportunistic sweeps
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "sweep_interval_secs", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
}

fn default_expiration() -> Duration {
    TokenConfig::DEFAULT_EXPIRATION
}

fn default_refill_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_burst() -> u32 {
    5
}

fn default_idle_ttl() -> Duration {
    AdmissionController::DEFAULT_IDLE_TTL
}

fn default_sweep_interval() -> Duration {
    AdmissionController::DEFAULT_SWEEP_INTERVAL
}

impl GatewayConfig {
    /// Load from a file, letting `CHOPPER_*` environment variables override it
    ///
    /// The format is picked from the extension: `.toml`, `.yaml`/`.yml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The file does not exist or has an unsupported extension
    /// - The file or environment cannot be parsed into the expected shape
    /// - A loaded setting fails validation
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Like [`from_file`](Self::from_file) with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file)
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };
        let path = path.to_str().ok_or(ConfigError::UnsupportedFormat)?;

        let config = Config::builder()
            .add_source(File::new(path, format))
            .add_source(Self::environment(env_prefix))
            .build()?;
        Self::finish(config)
    }

    /// Load from `CHOPPER_*` environment variables only
    ///
    /// # Errors
    ///
    /// Returns error if a required setting is missing, a value has the wrong
    /// type, or the result fails validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(Self::environment(ENV_PREFIX))
            .build()?;
        Self::finish(config)
    }

    /// Load from an explicit variable map instead of the process environment
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env)
    pub fn from_env_map(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(Self::environment(ENV_PREFIX).source(Some(vars)))
            .build()?;
        Self::finish(config)
    }

    /// Check every setting the gateway would otherwise reject at construction
    ///
    /// # Errors
    ///
    /// Returns the first invalid token or admission setting
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.token.validate()?;
        self.admission.validate()
    }

    fn environment(prefix: &str) -> Environment {
        Environment::with_prefix(prefix)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }
}

impl TokenConfig {
    /// Lifetime used when none is configured
    pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(3600);

    /// Settings with the default one-hour lifetime
    pub fn new(
        secret: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            secret: SecretString::new(secret.into()),
            issuer: issuer.into(),
            audience: audience.into(),
            expiration: Self::DEFAULT_EXPIRATION,
        }
    }

    /// Override the token lifetime
    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    /// Length of the signing secret in bytes
    pub fn secret_len(&self) -> usize {
        self.secret.expose_secret().len()
    }

    /// Reject settings no authority can be built from
    ///
    /// # Errors
    ///
    /// Returns error for an empty secret, issuer or audience, or a lifetime
    /// under one second
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.expose_secret().is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        if self.issuer.is_empty() {
            return Err(ConfigError::EmptyField("issuer"));
        }
        if self.audience.is_empty() {
            return Err(ConfigError::EmptyField("audience"));
        }
        if self.expiration < Duration::from_secs(1) {
            return Err(ConfigError::ExpirationTooShort);
        }
        Ok(())
    }
}

impl AdmissionConfig {
    /// The bucket policy these settings describe
    ///
    /// # Errors
    ///
    /// Returns error if the burst or refill interval is zero
    pub fn policy(&self) -> Result<BucketPolicy, ConfigError> {
        BucketPolicy::new(self.refill_interval, self.burst)
    }

    /// Reject a zero burst or refill interval
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroBurst`] or [`ConfigError::ZeroRefillInterval`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy().map(|_| ())
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            refill_interval: default_refill_interval(),
            burst: default_burst(),
            idle_ttl: default_idle_ttl(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{extension}"))
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_from_toml_file() {
        let file = write_config(
            "toml",
            r#"
            [token]
            secret = "0123456789abcdef0123456789abcdef"
            issuer = "chopper"
            audience = "chopper-web"
            expiration_secs = 900

            [admission]
            refill_interval_ms = 250
            burst = 8
            "#,
        );

        let config =
            GatewayConfig::from_file_with_prefix(file.path(), "CHOPPER_TEST_TOML").unwrap();
        assert_eq!(config.token.issuer, "chopper");
        assert_eq!(config.token.expiration, Duration::from_secs(900));
        assert_eq!(config.token.secret_len(), 32);
        assert_eq!(config.admission.refill_interval, Duration::from_millis(250));
        assert_eq!(config.admission.burst, 8);
        assert_eq!(config.admission.idle_ttl, AdmissionController::DEFAULT_IDLE_TTL);
    }

    #[test]
    fn test_from_json_file_with_defaults() {
        let file = write_config(
            "json",
            r#"{"token": {"secret": "s", "issuer": "i", "audience": "a"}}"#,
        );

        let config =
            GatewayConfig::from_file_with_prefix(file.path(), "CHOPPER_TEST_JSON").unwrap();
        assert_eq!(config.token.expiration, TokenConfig::DEFAULT_EXPIRATION);
        assert_eq!(config.admission, AdmissionConfig::default());
    }

    #[test]
    fn test_env_map_overrides() {
        let vars = HashMap::from([
            ("CHOPPER_TOKEN__SECRET".to_string(), "from-env".to_string()),
            ("CHOPPER_TOKEN__ISSUER".to_string(), "chopper".to_string()),
            ("CHOPPER_TOKEN__AUDIENCE".to_string(), "chopper-web".to_string()),
            ("CHOPPER_ADMISSION__BURST".to_string(), "2".to_string()),
        ]);

        let config = GatewayConfig::from_env_map(vars).unwrap();
        assert_eq!(config.token.secret.expose_secret(), "from-env");
        assert_eq!(config.admission.burst, 2);
    }

    #[test]
    fn test_missing_file() {
        let result = GatewayConfig::from_file("/nonexistent/chopper.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_config("ini", "token.secret = x");
        let result = GatewayConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat)));
    }

    #[test]
    fn test_zero_burst_is_rejected_at_load() {
        let file = write_config(
            "toml",
            r#"
            [token]
            secret = "s"
            issuer = "i"
            audience = "a"

            [admission]
            burst = 0
            "#,
        );
        let result = GatewayConfig::from_file_with_prefix(file.path(), "CHOPPER_TEST_ZERO");
        assert!(matches!(result, Err(ConfigError::ZeroBurst)));
    }

    #[test]
    fn test_token_validation() {
        assert!(matches!(
            TokenConfig::new("", "i", "a").validate(),
            Err(ConfigError::EmptySecret)
        ));
        assert!(matches!(
            TokenConfig::new("s", "i", "").validate(),
            Err(ConfigError::EmptyField("audience"))
        ));
        assert!(matches!(
            TokenConfig::new("s", "i", "a")
                .with_expiration(Duration::ZERO)
                .validate(),
            Err(ConfigError::ExpirationTooShort)
        ));
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = TokenConfig::new("hunter2-hunter2", "i", "a");
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
