//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string (`memory://` selects the
//!   in-process store for local development)
//! - `ZOHO_ORGANIZATION_ID` - Zoho Inventory organization ID
//! - `ZOHO_CLIENT_ID` - Zoho OAuth client ID
//! - `ZOHO_CLIENT_SECRET` - Zoho OAuth client secret
//! - `ZOHO_REFRESH_TOKEN` - Long-lived Zoho OAuth refresh token
//!
//! ## Optional
//! - `API_HOST` - Bind address (default: 127.0.0.1)
//! - `API_PORT` - Listen port (default: 3002)
//! - `ZOHO_API_BASE_URL` - Zoho API domain (default: <https://www.zohoapis.com>)
//! - `ZOHO_ACCOUNTS_URL` - Zoho accounts domain (default: <https://accounts.zoho.com>)
//! - `ZOHO_PER_PAGE` - Page size for list calls (default: 200, max 200)
//! - `ZOHO_REQUEST_DELAY_MS` - Fixed pause between detail calls (default: 150)
//! - `ZOHO_MAX_PAGES` - Upper bound on list pages per sync run (default: 100)
//! - `SYNC_PROCESS_AFTER` - Apply adjustments to outlet stock after every sync (default: false)
//! - `PROCESSING_CLAIM_TIMEOUT_SECS` - Age at which an unfinished processing claim is
//!   released for retry (default: 900)
//! - `LOCATION_MODULE_MAP` - JSON object replacing the built-in location → module table
//! - `CORS_ALLOWED_ORIGIN` - Dashboard origin allowed to call the API
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` / `SENTRY_TRACES_SAMPLE_RATE` - Sentry sample rates (default: 1.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use outlet_stock_core::LocationModuleMap;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const DEFAULT_ZOHO_API_BASE_URL: &str = "https://www.zohoapis.com";
const DEFAULT_ZOHO_ACCOUNTS_URL: &str = "https://accounts.zoho.com";
const MAX_ZOHO_PER_PAGE: u32 = 200;
pub const MEMORY_DATABASE_URL: &str = "memory://";
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Zoho Inventory API configuration
    pub zoho: ZohoConfig,
    /// Sync job tuning
    pub sync: SyncConfig,
    /// Location name → module association table
    pub location_modules: LocationModuleMap,
    /// Dashboard origin allowed by CORS (none = same-origin only)
    pub cors_allowed_origin: Option<String>,
    /// Emit JSON logs instead of human-readable text
    pub json_logs: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Zoho Inventory API configuration.
///
/// Implements `Debug` manually to redact the OAuth credentials.
#[derive(Clone)]
pub struct ZohoConfig {
    /// Zoho organization ID sent with every request
    pub organization_id: String,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: SecretString,
    /// Long-lived refresh token used to mint access tokens
    pub refresh_token: SecretString,
    /// API domain (region specific, e.g. <https://www.zohoapis.eu>)
    pub api_base_url: Url,
    /// Accounts domain used for token refresh
    pub accounts_url: Url,
    /// Records per list page
    pub per_page: u32,
}

impl std::fmt::Debug for ZohoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZohoConfig")
            .field("organization_id", &self.organization_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("accounts_url", &self.accounts_url.as_str())
            .field("per_page", &self.per_page)
            .finish()
    }
}

/// Sync job tuning.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fixed pause between consecutive Zoho calls
    pub request_delay: Duration,
    /// Upper bound on list pages fetched in a single run
    pub max_pages: u32,
    /// Run the processing job after every sync
    pub process_after_sync: bool,
    /// Age at which a `processing` claim is considered abandoned
    pub claim_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(150),
            max_pages: 100,
            process_after_sync: false,
            claim_timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = SecretString::from(get_required_env("DATABASE_URL")?);
        let host = get_env_or_default("API_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("API_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("API_PORT", "3002")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("API_PORT".to_string(), e.to_string()))?;

        let zoho = ZohoConfig::from_env()?;
        let sync = SyncConfig::from_env()?;
        let location_modules = location_modules_from_env()?;

        let json_logs = get_optional_env("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            database_url,
            host,
            port,
            zoho,
            sync,
            location_modules,
            cors_allowed_origin: get_optional_env("CORS_ALLOWED_ORIGIN"),
            json_logs,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the in-process store was requested instead of `PostgreSQL`.
    #[must_use]
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.expose_secret() == MEMORY_DATABASE_URL
    }
}

/// Load the location → module table, honouring `LOCATION_MODULE_MAP`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` if the override is not a valid table.
pub fn location_modules_from_env() -> Result<LocationModuleMap, ConfigError> {
    match get_optional_env("LOCATION_MODULE_MAP") {
        Some(json) => LocationModuleMap::from_json(&json).map_err(|e| {
            ConfigError::InvalidEnvVar("LOCATION_MODULE_MAP".to_string(), e.to_string())
        }),
        None => Ok(LocationModuleMap::default()),
    }
}

/// Load only `DATABASE_URL`, for tools that do not talk to Zoho.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if it is not set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    get_required_env("DATABASE_URL").map(SecretString::from)
}

impl ZohoConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let per_page = parse_env("ZOHO_PER_PAGE", MAX_ZOHO_PER_PAGE)?;
        if per_page == 0 || per_page > MAX_ZOHO_PER_PAGE {
            return Err(ConfigError::InvalidEnvVar(
                "ZOHO_PER_PAGE".to_string(),
                format!("must be between 1 and {MAX_ZOHO_PER_PAGE}"),
            ));
        }

        Ok(Self {
            organization_id: get_required_env("ZOHO_ORGANIZATION_ID")?,
            client_id: get_required_env("ZOHO_CLIENT_ID")?,
            client_secret: get_validated_secret("ZOHO_CLIENT_SECRET")?,
            refresh_token: get_validated_secret("ZOHO_REFRESH_TOKEN")?,
            api_base_url: get_url("ZOHO_API_BASE_URL", DEFAULT_ZOHO_API_BASE_URL)?,
            accounts_url: get_url("ZOHO_ACCOUNTS_URL", DEFAULT_ZOHO_ACCOUNTS_URL)?,
            per_page,
        })
    }
}

impl SyncConfig {
    /// Load sync and processing tuning. Every variable is optional.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a variable is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let delay_ms = parse_env(
            "ZOHO_REQUEST_DELAY_MS",
            u64::try_from(defaults.request_delay.as_millis()).unwrap_or(150),
        )?;
        let max_pages = parse_env("ZOHO_MAX_PAGES", defaults.max_pages)?;
        if max_pages == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "ZOHO_MAX_PAGES".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let process_after_sync = match get_optional_env("SYNC_PROCESS_AFTER") {
            Some(value) => parse_bool(&value).ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "SYNC_PROCESS_AFTER".to_string(),
                    format!("expected true/false, got {value:?}"),
                )
            })?,
            None => defaults.process_after_sync,
        };

        let claim_timeout_secs =
            parse_env("PROCESSING_CLAIM_TIMEOUT_SECS", defaults.claim_timeout.as_secs())?;
        if claim_timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "PROCESSING_CLAIM_TIMEOUT_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            request_delay: Duration::from_millis(delay_ms),
            max_pages,
            process_after_sync,
            claim_timeout: Duration::from_secs(claim_timeout_secs),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an optional environment variable, falling back to `default`.
fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse an optional URL variable, falling back to `default`.
fn get_url(key: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = get_env_or_default(key, default);
    Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
