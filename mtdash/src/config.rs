//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `MTDASH_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `MTDASH_` override YAML values
//! 3. **Data source credentials** - `SUPABASE_URL` / `SUPABASE_KEY` feed the production, staging
//!    and development profiles; `STAGING_SUPABASE_*`, `DEV_SUPABASE_*` and `TEST_SUPABASE_*`
//!    override their own profile
//! 4. **`--environment`** - Selects the active profile
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `MTDASH_CLIENT__REQUESTS_PER_SECOND=5` sets the `client.requests_per_second` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use mtdash::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//! let source = config.data_source()?;
//!
//! println!("Reading from {} ({})", source.url, source.environment);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Production credentials
//! SUPABASE_URL="https://abcd.supabase.co"
//! SUPABASE_KEY="service-key"
//!
//! # Separate staging project
//! STAGING_SUPABASE_URL="https://staging.supabase.co"
//!
//! # Select the profile and tune the client
//! MTDASH_ENVIRONMENT=staging
//! MTDASH_CLIENT__REQUESTS_PER_SECOND=5
//! MTDASH_CACHE__TTL=2m
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;

/// Credential variables of the hosted database, mapped onto the profile keys they feed.
///
/// Order matters: the shared pair is merged first so the environment specific variables win.
const CREDENTIAL_VARIABLES: &[(&str, &str)] = &[
    ("SUPABASE_URL", "environments.production.url"),
    ("SUPABASE_KEY", "environments.production.key"),
    ("SUPABASE_URL", "environments.staging.url"),
    ("SUPABASE_KEY", "environments.staging.key"),
    ("SUPABASE_URL", "environments.development.url"),
    ("SUPABASE_KEY", "environments.development.key"),
    ("STAGING_SUPABASE_URL", "environments.staging.url"),
    ("STAGING_SUPABASE_KEY", "environments.staging.key"),
    ("DEV_SUPABASE_URL", "environments.development.url"),
    ("DEV_SUPABASE_KEY", "environments.development.key"),
    ("TEST_SUPABASE_URL", "environments.testing.url"),
    ("TEST_SUPABASE_KEY", "environments.testing.key"),
];

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Mileage Tracker analytics service", long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "MTDASH_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Deployment environment to read from (development, staging, production, testing)
    #[arg(short = 'e', long, env = "MTDASH_ENVIRONMENT")]
    pub environment: Option<String>,

    /// Validate configuration and exit without starting the server
    #[arg(long)]
    pub validate: bool,
}

/// Configuration failures. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown environment '{name}' (expected one of development, staging, production, testing)")]
    UnknownEnvironment { name: String },

    #[error("Missing {field} for {environment} environment")]
    MissingCredentials { environment: Environment, field: &'static str },

    #[error("Invalid data source URL for {environment} environment: {message}")]
    InvalidUrl { environment: Environment, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error(transparent)]
    Figment(#[from] figment::Error),
}

/// Named deployment environments, each with its own data source profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
    Testing,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Testing => "testing",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            "testing" | "test" => Ok(Environment::Testing),
            _ => Err(ConfigError::UnknownEnvironment { name: s.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Name of the active environment profile
    pub environment: String,
    pub environments: EnvironmentProfiles,
    pub client: ClientConfig,
    pub cache: CacheConfig,
    pub refresh: RefreshConfig,
    pub analytics: AnalyticsConfig,
    /// Origins allowed to call the API from a browser. Empty allows any origin.
    pub cors_allowed_origins: Vec<String>,
    /// Expose Prometheus metrics at `/internal/metrics`
    pub enable_metrics: bool,
    /// Export traces over OTLP (configured through the standard `OTEL_*` variables)
    pub enable_otel_export: bool,
}

/// Data source profiles for every named environment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentProfiles {
    pub development: DataSourceProfile,
    pub staging: DataSourceProfile,
    pub production: DataSourceProfile,
    pub testing: DataSourceProfile,
}

impl EnvironmentProfiles {
    pub fn get(&self, environment: Environment) -> &DataSourceProfile {
        match environment {
            Environment::Development => &self.development,
            Environment::Staging => &self.staging,
            Environment::Production => &self.production,
            Environment::Testing => &self.testing,
        }
    }
}

impl Default for EnvironmentProfiles {
    fn default() -> Self {
        Self {
            development: DataSourceProfile {
                timeout: Duration::from_secs(60),
                max_retries: 5,
                ..Default::default()
            },
            staging: DataSourceProfile::default(),
            production: DataSourceProfile::default(),
            testing: DataSourceProfile {
                url: Some("https://test.supabase.co".to_string()),
                key: Some("test_key".to_string()),
                timeout: Duration::from_secs(10),
                max_retries: 1,
            },
        }
    }
}

/// Endpoint, key and resilience settings of one environment.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataSourceProfile {
    /// Project URL of the hosted database (the REST path is appended)
    pub url: Option<String>,
    /// API key, sent as both `apikey` and bearer token
    pub key: Option<String>,
    /// Per request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
}

impl Default for DataSourceProfile {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

impl fmt::Debug for DataSourceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceProfile")
            .field("url", &self.url)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// A fully resolved data source for the active environment.
#[derive(Clone)]
pub struct DataSourceSettings {
    pub environment: Environment,
    pub url: Url,
    pub key: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl fmt::Debug for DataSourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceSettings")
            .field("environment", &self.environment)
            .field("url", &self.url.as_str())
            .field("key", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Behaviour of the data access client shared by every environment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Ceiling on outbound requests; excess calls wait for a slot
    pub requests_per_second: u32,
    /// Delay before the first retry; doubles on every further attempt
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub retry_backoff_factor: u32,
    /// Upper bound on a single retry delay
    #[serde(with = "humantime_serde")]
    pub retry_max_delay: Duration,
    /// Rows requested per page when reading whole tables
    pub page_size: u32,
    /// How long a health report is reused before probing again
    #[serde(with = "humantime_serde")]
    pub health_check_interval: Duration,
    /// Reads slower than this are logged as warnings
    #[serde(with = "humantime_serde")]
    pub slow_query_threshold: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            retry_base_delay: Duration::from_millis(500),
            retry_backoff_factor: 2,
            retry_max_delay: Duration::from_secs(8),
            page_size: 1000,
            health_check_interval: Duration::from_secs(300),
            slow_query_threshold: Duration::from_secs(1),
        }
    }
}

/// Query result cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Lifetime of cached analytics results
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Lifetime of the live activity feed
    #[serde(with = "humantime_serde")]
    pub live_ttl: Duration,
    /// Maximum number of cached results per cache
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            live_ttl: Duration::from_secs(60),
            max_capacity: 1000,
        }
    }
}

/// Periodic cache warm-up.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(300),
        }
    }
}

/// Defaults and business constants used by the analytics queries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyticsConfig {
    /// Trailing window for "active users" when the caller gives none
    pub active_window_days: u32,
    /// Days without a trip before a user counts as at risk
    pub at_risk_inactivity_days: u32,
    pub top_users_limit: usize,
    pub recent_trips_limit: usize,
    /// Keep users without trips in top user listings
    pub include_inactive_in_top_users: bool,
    /// Monthly price per subscription tier (keys compared case-insensitively)
    pub pricing: BTreeMap<String, Decimal>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            active_window_days: 30,
            at_risk_inactivity_days: 14,
            top_users_limit: 10,
            recent_trips_limit: 20,
            include_inactive_in_top_users: false,
            pricing: default_pricing(),
        }
    }
}

fn default_pricing() -> BTreeMap<String, Decimal> {
    BTreeMap::from([
        ("free".to_string(), Decimal::ZERO),
        ("basic".to_string(), Decimal::new(999, 2)),
        ("premium".to_string(), Decimal::new(1999, 2)),
        ("pro".to_string(), Decimal::new(3999, 2)),
        ("enterprise".to_string(), Decimal::new(9999, 2)),
    ])
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            environment: Environment::Production.as_str().to_string(),
            environments: EnvironmentProfiles::default(),
            client: ClientConfig::default(),
            cache: CacheConfig::default(),
            refresh: RefreshConfig::default(),
            analytics: AnalyticsConfig::default(),
            cors_allowed_origins: Vec::new(),
            enable_metrics: true,
            enable_otel_export: false,
        }
    }
}

impl Config {
    /// Load configuration from file and environment, then validate it.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(args).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        let mut figment = Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // MTDASH_CONFIG names the file itself, not a field
            .merge(Env::prefixed("MTDASH_").ignore(&["config"]).split("__"));

        for &(variable, key) in CREDENTIAL_VARIABLES {
            figment = figment.merge(Env::raw().only(&[variable]).map(move |_| key.into()));
        }

        if let Some(environment) = &args.environment {
            figment = figment.merge(Serialized::default("environment", environment));
        }

        figment
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.data_source()?;

        if self.client.requests_per_second == 0 {
            return Err(invalid("client.requests_per_second must be greater than zero"));
        }
        if self.client.retry_backoff_factor == 0 {
            return Err(invalid("client.retry_backoff_factor must be at least 1"));
        }
        if self.client.page_size == 0 {
            return Err(invalid("client.page_size must be greater than zero"));
        }
        if self.cache.ttl.is_zero() || self.cache.live_ttl.is_zero() {
            return Err(invalid("cache TTLs must be greater than zero"));
        }
        if self.refresh.enabled && self.refresh.interval.is_zero() {
            return Err(invalid("refresh.interval must be greater than zero when refresh is enabled"));
        }
        if self.analytics.active_window_days == 0 || self.analytics.at_risk_inactivity_days == 0 {
            return Err(invalid("analytics windows must be at least one day"));
        }
        if let Some((tier, price)) = self.analytics.pricing.iter().find(|(_, price)| price.is_sign_negative()) {
            return Err(invalid(format!("price for tier '{tier}' is negative ({price})")));
        }

        Ok(())
    }

    /// The active environment.
    pub fn active_environment(&self) -> Result<Environment, ConfigError> {
        self.environment.parse()
    }

    /// Resolve endpoint and key for the active environment.
    pub fn data_source(&self) -> Result<DataSourceSettings, ConfigError> {
        self.data_source_for(self.active_environment()?)
    }

    /// Resolve endpoint and key for a named environment, failing when either is absent.
    pub fn data_source_for(&self, environment: Environment) -> Result<DataSourceSettings, ConfigError> {
        let profile = self.environments.get(environment);

        let url = non_empty(profile.url.as_deref()).ok_or(ConfigError::MissingCredentials {
            environment,
            field: "url",
        })?;
        let key = non_empty(profile.key.as_deref()).ok_or(ConfigError::MissingCredentials {
            environment,
            field: "key",
        })?;

        let url = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            environment,
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                environment,
                message: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        Ok(DataSourceSettings {
            environment,
            url,
            key: key.to_string(),
            timeout: profile.timeout,
            max_retries: profile.max_retries,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { message: message.into() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(config: &str) -> Args {
        Args {
            config: config.to_string(),
            environment: None,
            validate: false,
        }
    }

    #[test]
    fn test_yaml_profiles_and_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
environment: staging
environments:
  staging:
    url: https://staging.example.co
    key: staging-key
    timeout: 15s
client:
  requests_per_second: 4
cache:
  ttl: 2m
"#,
            )?;

            let config = Config::load(&args("test.yaml")).map_err(|e| e.to_string())?;
            let source = config.data_source().map_err(|e| e.to_string())?;

            assert_eq!(source.environment, Environment::Staging);
            assert_eq!(source.url.as_str(), "https://staging.example.co/");
            assert_eq!(source.key, "staging-key");
            assert_eq!(source.timeout, Duration::from_secs(15));
            assert_eq!(source.max_retries, 3);
            assert_eq!(config.client.requests_per_second, 4);
            assert_eq!(config.client.retry_base_delay, Duration::from_millis(500));
            assert_eq!(config.cache.ttl, Duration::from_secs(120));
            assert_eq!(config.cache.live_ttl, Duration::from_secs(60));
            assert_eq!(config.analytics.pricing.get("premium"), Some(&Decimal::new(1999, 2)));

            Ok(())
        });
    }

    #[test]
    fn test_shared_credentials_feed_staging() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "environment: staging\n")?;
            jail.set_env("SUPABASE_URL", "https://prod.example.co");
            jail.set_env("SUPABASE_KEY", "prod-key");

            let config = Config::load(&args("test.yaml")).map_err(|e| e.to_string())?;
            let staging = config.data_source().map_err(|e| e.to_string())?;
            assert_eq!(staging.url.as_str(), "https://prod.example.co/");
            assert_eq!(staging.key, "prod-key");

            // Environment specific variables win over the shared pair
            jail.set_env("STAGING_SUPABASE_URL", "https://staging.example.co");
            let config = Config::load(&args("test.yaml")).map_err(|e| e.to_string())?;
            let staging = config.data_source().map_err(|e| e.to_string())?;
            assert_eq!(staging.url.as_str(), "https://staging.example.co/");
            assert_eq!(staging.key, "prod-key");

            Ok(())
        });
    }

    #[test]
    fn test_testing_profile_has_placeholder_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "")?;
            let mut args = args("test.yaml");
            args.environment = Some("testing".to_string());

            let config = Config::load(&args).map_err(|e| e.to_string())?;
            let source = config.data_source().map_err(|e| e.to_string())?;
            assert_eq!(source.url.as_str(), "https://test.supabase.co/");
            assert_eq!(source.max_retries, 1);
            assert_eq!(source.timeout, Duration::from_secs(10));

            Ok(())
        });
    }

    #[test]
    fn test_missing_credentials_fail_fast() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "environment: production\n")?;

            let err = Config::load(&args("test.yaml")).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::MissingCredentials {
                    environment: Environment::Production,
                    field: "url"
                }
            ));

            jail.set_env("SUPABASE_URL", "https://prod.example.co");
            let err = Config::load(&args("test.yaml")).unwrap_err();
            assert!(matches!(err, ConfigError::MissingCredentials { field: "key", .. }));
            assert_eq!(err.to_string(), "Missing key for production environment");

            Ok(())
        });
    }

    #[test]
    fn test_unknown_environment_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "")?;
            let mut args = args("test.yaml");
            args.environment = Some("qa".to_string());

            let err = Config::load(&args).unwrap_err();
            assert!(matches!(err, ConfigError::UnknownEnvironment { ref name } if name == "qa"));

            Ok(())
        });
    }

    #[test]
    fn test_env_override_nested_values() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
environment: testing
client:
  requests_per_second: 10
"#,
            )?;
            jail.set_env("MTDASH_CLIENT__REQUESTS_PER_SECOND", "3");
            jail.set_env("MTDASH_REFRESH__ENABLED", "true");
            jail.set_env("MTDASH_CONFIG", "test.yaml");

            let config = Config::load(&args("test.yaml")).map_err(|e| e.to_string())?;
            assert_eq!(config.client.requests_per_second, 3);
            assert!(config.refresh.enabled);

            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
environment: testing
client:
  requests_per_second: 0
"#,
            )?;
            let err = Config::load(&args("test.yaml")).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }));

            jail.create_file(
                "test.yaml",
                r#"
environment: testing
analytics:
  pricing:
    basic: "-1.00"
"#,
            )?;
            let err = Config::load(&args("test.yaml")).unwrap_err();
            assert!(err.to_string().contains("basic"));

            jail.create_file(
                "test.yaml",
                r#"
environment: testing
environments:
  testing:
    url: ftp://files.example.co
    key: k
"#,
            )?;
            let err = Config::load(&args("test.yaml")).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidUrl { .. }));

            Ok(())
        });
    }

    #[test]
    fn test_debug_redacts_keys() {
        let profile = DataSourceProfile {
            key: Some("super-secret".to_string()),
            ..Default::default()
        };
        assert!(!format!("{profile:?}").contains("super-secret"));
    }
}
