//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::GuardConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "productguard";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_REDIS_MAX_CONNECTIONS: u64 = 16;
const DEFAULT_DB_MAX_CONNECTIONS: u64 = 8;
const DEFAULT_DB_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

/// Command-line arguments for the productguard binary.
#[derive(Debug, Parser)]
#[command(name = "productguard", version, about = "Read-through product cache guard")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PRODUCTGUARD_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Read a product through the cache, filling it on a miss.
    Get(GetArgs),
    /// Re-read a product from the database and push it into the cache.
    Refresh(IdArgs),
    /// Remove a product's cache entry.
    Delete(IdArgs),
    /// Apply a JSON change notification, e.g. `{"kind":"upserted","id":42}`.
    Apply(ApplyArgs),
    /// Run database migrations.
    Migrate,
}

#[derive(Debug, Args, Clone)]
pub struct IdArgs {
    /// Product identifier.
    #[arg(value_name = "ID", allow_negative_numbers = true)]
    pub id: i64,
}

#[derive(Debug, Args, Clone)]
pub struct GetArgs {
    /// Product identifier.
    #[arg(value_name = "ID", allow_negative_numbers = true)]
    pub id: i64,

    /// Issue this many concurrent lookups for the identifier.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub concurrency: u32,
}

#[derive(Debug, Args, Clone)]
pub struct ApplyArgs {
    /// Change notification as JSON.
    #[arg(value_name = "EVENT")]
    pub event: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the Redis connection URL.
    #[arg(long = "redis-url", value_name = "URL", global = true)]
    pub redis_url: Option<String>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the cache key namespace.
    #[arg(long = "cache-namespace", value_name = "NAMESPACE", global = true)]
    pub cache_namespace: Option<String>,

    /// Override the base expiry of cached products.
    #[arg(long = "cache-expire-seconds", value_name = "SECONDS", global = true)]
    pub cache_expire_seconds: Option<u64>,

    /// Override the expiry of not-found tombstones.
    #[arg(long = "cache-expire-not-found-seconds", value_name = "SECONDS", global = true)]
    pub cache_expire_not_found_seconds: Option<u64>,

    /// Override the maximum random offset added to product expiries.
    #[arg(long = "cache-expire-jitter-seconds", value_name = "SECONDS", global = true)]
    pub cache_expire_jitter_seconds: Option<u64>,

    /// Override the total wait for a contended fill lock.
    #[arg(long = "cache-lock-wait-ms", value_name = "MILLIS", global = true)]
    pub cache_lock_wait_ms: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub redis: RedisSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub max_connections: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    /// Upper bound on waiting for a pooled connection; an unreachable
    /// database surfaces as a record store error after this long.
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub namespace: String,
    pub expire: Duration,
    pub expire_not_found: Duration,
    pub expire_jitter: Duration,
    pub lock_ttl: Duration,
    pub lock_retry: Duration,
    pub lock_wait: Duration,
    pub unlock_attempts: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PRODUCTGUARD").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    redis: RawRedisSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.redis.url = Some(url.clone());
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(namespace) = overrides.cache_namespace.as_ref() {
            self.cache.namespace = Some(namespace.clone());
        }
        if let Some(seconds) = overrides.cache_expire_seconds {
            self.cache.expire_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_expire_not_found_seconds {
            self.cache.expire_not_found_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_expire_jitter_seconds {
            self.cache.expire_jitter_seconds = Some(seconds);
        }
        if let Some(millis) = overrides.cache_lock_wait_ms {
            self.cache.lock_wait_ms = Some(millis);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            redis,
            database,
            cache,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let redis = build_redis_settings(redis)?;
        let database = build_database_settings(database)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self {
            logging,
            redis,
            database,
            cache,
        })
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig::from(&self.cache)
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_redis_settings(redis: RawRedisSettings) -> Result<RedisSettings, LoadError> {
    let url = redis
        .url
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
    if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
        return Err(LoadError::invalid(
            "redis.url",
            format!("expected a redis:// or rediss:// URL, got `{url}`"),
        ));
    }

    let max_value = redis
        .max_connections
        .unwrap_or(DEFAULT_REDIS_MAX_CONNECTIONS);
    let max_connections = usize::try_from(max_value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| LoadError::invalid("redis.max_connections", "must be greater than zero"))?;

    Ok(RedisSettings {
        url,
        max_connections,
    })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value, "database.max_connections")?;
    let acquire_timeout = positive_millis(
        database
            .acquire_timeout_ms
            .unwrap_or(DEFAULT_DB_ACQUIRE_TIMEOUT_MS),
        "database.acquire_timeout_ms",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
        acquire_timeout,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = GuardConfig::default();

    let namespace = cache
        .namespace
        .map(|value| value.trim().to_string())
        .unwrap_or(defaults.namespace);
    if namespace.is_empty() || namespace.contains(char::is_whitespace) {
        return Err(LoadError::invalid(
            "cache.namespace",
            "must be non-empty and contain no whitespace",
        ));
    }

    let expire = positive_secs(
        cache.expire_seconds.unwrap_or(defaults.expire_seconds),
        "cache.expire_seconds",
    )?;
    let expire_not_found = positive_secs(
        cache
            .expire_not_found_seconds
            .unwrap_or(defaults.expire_not_found_seconds),
        "cache.expire_not_found_seconds",
    )?;
    let expire_jitter = Duration::from_secs(
        cache
            .expire_jitter_seconds
            .unwrap_or(defaults.expire_jitter_seconds),
    );

    let lock_ttl = positive_millis(
        cache.lock_ttl_ms.unwrap_or(defaults.lock_ttl_ms),
        "cache.lock_ttl_ms",
    )?;
    let lock_retry = positive_millis(
        cache.lock_retry_ms.unwrap_or(defaults.lock_retry_ms),
        "cache.lock_retry_ms",
    )?;
    if lock_retry >= lock_ttl {
        return Err(LoadError::invalid(
            "cache.lock_retry_ms",
            "must be shorter than cache.lock_ttl_ms",
        ));
    }
    let lock_wait = positive_millis(
        cache.lock_wait_ms.unwrap_or(defaults.lock_wait_ms),
        "cache.lock_wait_ms",
    )?;

    let unlock_attempts = non_zero_u32(
        cache
            .unlock_attempts
            .unwrap_or(u64::from(defaults.unlock_attempts)),
        "cache.unlock_attempts",
    )?;

    Ok(CacheSettings {
        namespace,
        expire,
        expire_not_found,
        expire_jitter,
        lock_ttl,
        lock_retry,
        lock_wait,
        unlock_attempts,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    url: Option<String>,
    max_connections: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u64>,
    acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    namespace: Option<String>,
    expire_seconds: Option<u64>,
    expire_not_found_seconds: Option<u64>,
    expire_jitter_seconds: Option<u64>,
    lock_ttl_ms: Option<u64>,
    lock_retry_ms: Option<u64>,
    lock_wait_ms: Option<u64>,
    unlock_attempts: Option<u64>,
}

fn positive_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
