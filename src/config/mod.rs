//! Configuration loading and validation for the Porter Dispatch Core.
//!
//! Configuration is loaded from multiple sources in order of precedence:
//! 1. Environment variables (highest)
//! 2. Environment-specific file (e.g., `development.toml`)
//! 3. Default file (`default.toml`)
//!
//! # Example
//!
//! ```ignore
//! use porter_dispatch_core::config::Settings;
//!
//! let settings = Settings::load("development")?;
//! println!("offer timeout: {}", settings.dispatch.offer_timeout_seconds);
//! ```

mod settings;

pub use settings::{
    ApiSettings, DatabaseSettings, DispatchSettings, EventBusSettings, HotStoreSettings,
    LoggingSettings, MetricsSettings, RateLimitSettings, Settings,
};
