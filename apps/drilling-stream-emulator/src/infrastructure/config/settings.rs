//! Emulator Configuration Settings
//!
//! Configuration types for the emulator, loaded from environment variables.

use std::time::Duration;

/// Default Notion API base URL.
const DEFAULT_NOTION_API_URL: &str = "https://api.notion.com/v1";

/// Notion API version that exposes the data sources endpoints.
const DEFAULT_NOTION_VERSION: &str = "2025-09-03";

/// Property the Notion query is sorted by.
const DEFAULT_SORT_PROPERTY: &str = "Номер";

/// Notion API credentials and query settings.
#[derive(Clone)]
pub struct NotionSettings {
    api_key: String,
    /// Data source (database) identifier.
    pub data_source_id: String,
    /// API base URL, without trailing slash.
    pub api_url: String,
    /// Value of the `Notion-Version` header.
    pub api_version: String,
    /// Property used for ascending sort (`None` = Notion's default order).
    pub sort_property: Option<String>,
    /// Page size for paginated queries (Notion caps this at 100).
    pub page_size: u32,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl NotionSettings {
    /// Create settings with defaults for everything but the credentials.
    #[must_use]
    pub fn new(api_key: String, data_source_id: String) -> Self {
        Self {
            api_key,
            data_source_id,
            api_url: DEFAULT_NOTION_API_URL.to_string(),
            api_version: DEFAULT_NOTION_VERSION.to_string(),
            sort_property: Some(DEFAULT_SORT_PROPERTY.to_string()),
            page_size: 100,
            timeout: Duration::from_secs(30),
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for NotionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionSettings")
            .field("api_key", &"[REDACTED]")
            .field("data_source_id", &self.data_source_id)
            .field("api_url", &self.api_url)
            .field("api_version", &self.api_version)
            .field("sort_property", &self.sort_property)
            .field("page_size", &self.page_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Broadcast loop settings.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Tick interval.
    pub interval: Duration,
    /// Deadline for a single client write.
    pub send_timeout: Duration,
    /// Frames buffered per client before writes start to wait.
    pub client_buffer: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            send_timeout: Duration::from_millis(1000),
            client_buffer: 64,
        }
    }
}

/// Backoff for the startup load.
#[derive(Debug, Clone)]
pub struct LoadRetrySettings {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Maximum attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for LoadRetrySettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// SSE stream HTTP port.
    pub port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 3000,
            health_port: 8082,
        }
    }
}

/// Complete emulator configuration.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Notion settings.
    pub notion: NotionSettings,
    /// Broadcast loop settings.
    pub broadcast: BroadcastSettings,
    /// Startup load retry settings.
    pub load_retry: LoadRetrySettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl EmulatorConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing,
    /// empty, or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let api_key = env.required("NOTION_API_KEY")?;
        let data_source_id = env.required("NOTION_DATABASE_ID")?;
        let interval_ms: u64 = env.required_parsed("SSE_INTERVAL")?;
        if interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SSE_INTERVAL".to_string(),
                value: "0".to_string(),
            });
        }
        let port: u16 = env.required_parsed("PORT")?;

        let notion_defaults = NotionSettings::new(api_key, data_source_id);
        let notion = NotionSettings {
            api_url: env
                .optional("NOTION_API_URL")
                .map_or(notion_defaults.api_url.clone(), |url| {
                    url.trim_end_matches('/').to_string()
                }),
            api_version: env
                .optional("NOTION_VERSION")
                .unwrap_or_else(|| notion_defaults.api_version.clone()),
            sort_property: match env.optional("NOTION_SORT_PROPERTY") {
                Some(property) if property == "-" => None,
                Some(property) => Some(property),
                None => notion_defaults.sort_property.clone(),
            },
            page_size: env
                .parsed_or("NOTION_PAGE_SIZE", notion_defaults.page_size)?
                .clamp(1, 100),
            timeout: Duration::from_secs(
                env.parsed_or("NOTION_TIMEOUT_SECS", notion_defaults.timeout.as_secs())?,
            ),
            ..notion_defaults
        };

        let broadcast_defaults = BroadcastSettings::default();
        let broadcast = BroadcastSettings {
            interval: Duration::from_millis(interval_ms),
            send_timeout: Duration::from_millis(env.parsed_or(
                "SSE_SEND_TIMEOUT_MS",
                duration_millis(broadcast_defaults.send_timeout),
            )?),
            client_buffer: env
                .parsed_or("SSE_CLIENT_BUFFER", broadcast_defaults.client_buffer)?
                .max(1),
        };

        let retry_defaults = LoadRetrySettings::default();
        let load_retry = LoadRetrySettings {
            initial_delay: Duration::from_millis(env.parsed_or(
                "NOTION_LOAD_RETRY_INITIAL_MS",
                duration_millis(retry_defaults.initial_delay),
            )?),
            max_delay: Duration::from_secs(env.parsed_or(
                "NOTION_LOAD_RETRY_MAX_SECS",
                retry_defaults.max_delay.as_secs(),
            )?),
            max_attempts: env.parsed_or("NOTION_LOAD_MAX_ATTEMPTS", retry_defaults.max_attempts)?,
        };

        let server = ServerSettings {
            port,
            health_port: env.parsed_or("HEALTH_PORT", ServerSettings::default().health_port)?,
        };

        Ok(Self {
            notion,
            broadcast,
            load_retry,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value '{value}'")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value)
    }

    fn required_parsed<T: std::str::FromStr>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self.required(key)?;
        parse_value(key, &value)
    }

    fn parsed_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        self.optional(key)
            .map_or(Ok(default), |value| parse_value(key, &value))
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
