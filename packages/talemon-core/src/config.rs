//! The typed configuration surface: a fixed tree deserialized from TOML with
//! `deny_unknown_fields` at every level, so an unrecognized key is a hard
//! startup error rather than a silently ignored typo. Secrets
//! (`DATABASE_URL`, object-store credentials) are layered in from the
//! environment separately, via [`Config::from_env_and_file`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use talemon_fingerprint::HasherConfig;
use talemon_objectstore::ObjectStoreConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(String, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(String, toml::de::Error),
    #[error("DATABASE_URL must be set")]
    MissingDatabaseUrl,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// `scheduler.*` — see §4.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// `T_zombie`. Must exceed `worker.heartbeat_interval_secs` by a safe
    /// factor (default >=10x) — see the lease correctness condition in §5.
    pub zombie_timeout_secs: u64,
    /// Candidate batch size per tick.
    pub batch_size: i64,
    /// How long to sleep between ticks when a tick admits nothing.
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            zombie_timeout_secs: 300,
            batch_size: 100,
            tick_interval_secs: 5,
        }
    }
}

/// `worker.*` — see §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    pub heartbeat_interval_secs: u64,
    pub page_timeout_secs: u64,
    /// Worker id, used only in log fields; defaults to a generated one at
    /// startup if left blank.
    pub worker_id: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            page_timeout_secs: 60,
            worker_id: String::new(),
        }
    }
}

/// `extractor.*` — see §4.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorConfig {
    pub batch_size: i64,
    pub poll_interval_secs: u64,
    /// The extractor version this process writes `PageInfo` rows under.
    pub version: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval_secs: 15,
            version: "v1".to_string(),
        }
    }
}

/// Per-domain rate limit: `requests` per `window_secs`, enforced by a
/// process-local keyed limiter (§9 — multi-scheduler open question).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 10,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub extractor: ExtractorConfig,
    pub hasher: HasherConfig,
    pub oss: ObjectStoreConfig,
    pub rate_limit: RateLimitConfig,

    /// Populated from `DATABASE_URL` after loading, never from the TOML
    /// file — secrets stay out of the structural config surface.
    #[serde(skip)]
    pub database_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            worker: WorkerConfig::default(),
            extractor: ExtractorConfig::default(),
            hasher: HasherConfig::default(),
            oss: ObjectStoreConfig::default(),
            rate_limit: RateLimitConfig::default(),
            database_url: String::new(),
        }
    }
}

impl Config {
    /// Parse the structural tree from a TOML file; unrecognized keys at any
    /// level are a hard error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse(path.display().to_string(), e))
    }

    /// Load `.env` (development convenience), parse the structural config
    /// file if `path` is given (otherwise the compiled-in defaults), then
    /// layer `DATABASE_URL` in from the environment. This is the split the
    /// ambient stack's own `Config::from_env` draws between structural
    /// config (file, checked into version control) and secrets (env, not).
    pub fn from_env_and_file(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        if config.worker.worker_id.is_empty() {
            config.worker.worker_id = format!("worker-{}", uuid::Uuid::new_v4());
        }

        Ok(config)
    }
}
