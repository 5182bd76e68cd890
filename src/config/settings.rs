//! Settings structs and loading logic.
//!
//! All settings have sensible defaults and can be overridden via
//! environment variables or configuration files.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Dispatch-domain tunables from spec §6's configuration table.
    pub dispatch: DispatchSettings,
    /// Durable store (`PostgreSQL`) configuration.
    pub database: DatabaseSettings,
    /// Hot-state store (moka/dashmap) configuration.
    pub hot_store: HotStoreSettings,
    /// Event bus (Apache Iggy) configuration.
    pub event_bus: EventBusSettings,
    /// API server configuration.
    pub api: ApiSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Metrics configuration.
    pub metrics: MetricsSettings,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// Files are loaded in this order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (if exists)
    /// 3. Environment variables with `DISPATCH_` prefix
    ///
    /// # Arguments
    /// * `environment` - Environment name (e.g., "development", "production")
    ///
    /// # Errors
    /// Returns `ConfigError` if configuration is invalid or cannot be loaded.
    pub fn load(environment: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let builder = Config::builder()
            // Dispatch defaults, per spec §6's configuration table.
            .set_default("dispatch.offer_timeout_seconds", 30)?
            .set_default("dispatch.max_concurrent_offers_per_porter", 3)?
            .set_default("dispatch.location_snapshot_interval_seconds", 60)?
            .set_default("dispatch.location_history_retention_days", 90)?
            .set_default("dispatch.location_update_rate_per_second", 10)?
            .set_default("dispatch.availability_state_ttl_seconds", 3600)?
            .set_default("dispatch.idempotency_record_ttl_hours", 24)?
            .set_default("dispatch.heartbeat_interval_seconds", 30)?
            .set_default("dispatch.rate_limit_fail_open_reads", true)?
            .set_default("dispatch.rate_limit_fail_open_mutations", false)?
            .set_default("dispatch.expire_offers_interval_seconds", 10)?
            .set_default("dispatch.cleanup_idempotency_interval_seconds", 3600)?
            .set_default("dispatch.cleanup_location_history_interval_seconds", 86400)?
            .set_default("database.url", "postgres://localhost/porter_dispatch")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout_ms", 5000)?
            .set_default("database.idle_timeout_ms", 600_000)?
            .set_default("hot_store.availability_max_capacity", 200_000)?
            .set_default("hot_store.location_max_capacity", 200_000)?
            .set_default("hot_store.session_max_capacity", 200_000)?
            .set_default("event_bus.url", "tcp://localhost:8090")?
            .set_default("event_bus.stream_name", "porter-dispatch")?
            .set_default("event_bus.partition_count", 3)?
            .set_default("event_bus.replication_factor", 1)?
            .set_default("event_bus.username", "iggy")?
            .set_default("event_bus.password", "iggy")?
            .set_default("api.host", "0.0.0.0")?
            .set_default("api.port", 8080)?
            .set_default("api.cors_origins", vec!["http://localhost:5173"])?
            .set_default("api.request_timeout_ms", 30000)?
            .set_default("api.rate_limit.requests_per_second", 100)?
            .set_default("api.rate_limit.burst_size", 200)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("logging.file_path", Option::<String>::None)?
            .set_default("metrics.enabled", true)?
            .set_default("metrics.host", "0.0.0.0")?
            .set_default("metrics.port", 9090)?
            // Load default configuration file.
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            // Load environment-specific file.
            .add_source(File::with_name(&format!("{config_dir}/{environment}")).required(false))
            // Override with environment variables (DISPATCH_ prefix).
            .add_source(
                Environment::with_prefix("DISPATCH")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load settings from a specific file path.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Validate settings and return any validation errors.
    ///
    /// # Errors
    /// Returns a list of validation error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.dispatch.offer_timeout_seconds == 0 {
            errors.push("dispatch.offer_timeout_seconds must be non-zero".into());
        }
        if self.dispatch.max_concurrent_offers_per_porter == 0 {
            errors.push("dispatch.max_concurrent_offers_per_porter must be non-zero".into());
        }
        if self.dispatch.location_update_rate_per_second == 0 {
            errors.push("dispatch.location_update_rate_per_second must be non-zero".into());
        }

        if self.database.url.is_empty() {
            errors.push("database.url cannot be empty".into());
        }
        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be non-zero".into());
        }
        if self.database.min_connections > self.database.max_connections {
            errors.push("database.min_connections cannot exceed max_connections".into());
        }

        if self.api.port == 0 {
            errors.push("api.port must be non-zero".into());
        }
        if self.api.rate_limit.requests_per_second == 0 {
            errors.push("api.rate_limit.requests_per_second must be non-zero".into());
        }

        if self.hot_store.availability_max_capacity == 0 {
            errors.push("hot_store.availability_max_capacity must be non-zero".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Dispatch-domain tunables, one field per row of spec §6's configuration table.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSettings {
    /// PENDING offer TTL before auto-expiry.
    pub offer_timeout_seconds: u64,
    /// Cap on in-flight PENDING offers per porter.
    pub max_concurrent_offers_per_porter: u32,
    /// Minimum gap between durable location snapshots per porter.
    pub location_snapshot_interval_seconds: u64,
    /// Snapshot prune age.
    pub location_history_retention_days: u32,
    /// Per-porter location update rate limit.
    pub location_update_rate_per_second: u32,
    /// Hot availability entry TTL.
    pub availability_state_ttl_seconds: u64,
    /// Idempotency cache age.
    pub idempotency_record_ttl_hours: u64,
    /// Porter-to-server keepalive cadence (suggested, not enforced).
    pub heartbeat_interval_seconds: u64,
    /// Whether the rate limiter fails open (allows the call through) when
    /// the hot store is unavailable, for non-mutating calls.
    pub rate_limit_fail_open_reads: bool,
    /// Whether the rate limiter fails open for mutating calls. Spec §9
    /// recommends `false` — fail-closed for mutations.
    pub rate_limit_fail_open_mutations: bool,
    /// Cadence of the `expire-offers` scheduled job.
    pub expire_offers_interval_seconds: u64,
    /// Cadence of the `cleanup-idempotency-records` scheduled job.
    pub cleanup_idempotency_interval_seconds: u64,
    /// Cadence of the `cleanup-location-history` scheduled job.
    pub cleanup_location_history_interval_seconds: u64,
}

impl DispatchSettings {
    /// Get the offer timeout as a `Duration`.
    #[must_use]
    pub const fn offer_timeout(&self) -> Duration {
        Duration::from_secs(self.offer_timeout_seconds)
    }

    /// Get the location-snapshot interval as a `Duration`.
    #[must_use]
    pub const fn location_snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.location_snapshot_interval_seconds)
    }

    /// Get the availability-state TTL as a `Duration`.
    #[must_use]
    pub const fn availability_state_ttl(&self) -> Duration {
        Duration::from_secs(self.availability_state_ttl_seconds)
    }

    /// Get the idempotency-record TTL as a `Duration`.
    #[must_use]
    pub const fn idempotency_record_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_record_ttl_hours * 3600)
    }

    /// Get the location-history retention window as a `Duration`.
    #[must_use]
    pub const fn location_history_retention(&self) -> Duration {
        Duration::from_secs(self.location_history_retention_days as u64 * 86400)
    }
}

/// Durable store (`PostgreSQL`) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum connections in the pool.
    pub max_connections: u32,
    /// Minimum connections to maintain.
    pub min_connections: u32,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Idle connection timeout in milliseconds.
    pub idle_timeout_ms: u64,
}

impl DatabaseSettings {
    /// Get the connection timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get the idle timeout as a `Duration`.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Hot-state store (moka/dashmap) configuration: the three logical
/// partitions named in spec §9 (availability, location, sessions).
#[derive(Debug, Clone, Deserialize)]
pub struct HotStoreSettings {
    /// Maximum number of cached availability entries.
    pub availability_max_capacity: u64,
    /// Maximum number of cached last-location entries.
    pub location_max_capacity: u64,
    /// Maximum number of cached device-session entries.
    pub session_max_capacity: u64,
}

/// Event bus (Apache Iggy) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EventBusSettings {
    /// Iggy server URL.
    pub url: String,
    /// Stream name for dispatch events.
    pub stream_name: String,
    /// Number of partitions for the stream.
    pub partition_count: u32,
    /// Replication factor.
    pub replication_factor: u32,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
}

/// API server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Rate limiting settings.
    pub rate_limit: RateLimitSettings,
}

impl ApiSettings {
    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Get the socket address string.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// Maximum requests per second per client.
    pub requests_per_second: u32,
    /// Burst size (allows temporary spikes).
    pub burst_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Log format (json, pretty).
    pub format: String,
    /// Optional file path for log output.
    pub file_path: Option<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Host to bind metrics server to.
    pub host: String,
    /// Port for metrics server.
    pub port: u16,
}

impl MetricsSettings {
    /// Get the metrics socket address string.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
