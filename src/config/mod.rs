//! Configuration management
//!
//! TOML-backed configuration with `${VAR}` substitution and `CARAVAN_*`
//! environment overrides. See [`schema::CaravanConfig`] for the shape and
//! [`loader::load_config`] for the loading pipeline.

pub mod loader;
pub mod schema;

pub use loader::load_config;
pub use schema::{
    ApplicationConfig, CaravanConfig, Environment, ExportConfig, IdempotencyConfig,
    LoggingConfig, MalformedRowPolicy, RateLimitConfig, RetryConfig, ServerConfig,
};

use crate::domain::result::Result;
use std::path::Path;

impl CaravanConfig {
    /// Loads and validates configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unparsable, or invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_config(path)
    }
}
