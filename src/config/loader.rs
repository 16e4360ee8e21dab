//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::CaravanConfig;
use crate::domain::errors::CaravanError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into CaravanConfig
/// 4. Applies environment variable overrides (CARAVAN_* prefix)
/// 5. Validates the configuration
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - Environment variable substitution fails
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use caravan::config::loader::load_config;
///
/// let config = load_config("caravan.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<CaravanConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(CaravanError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        CaravanError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: CaravanConfig = toml::from_str(&contents)
        .map_err(|e| CaravanError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config);

    config.validate().map_err(|e| {
        CaravanError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched so documented placeholders don't
/// require the variable to exist.
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid");
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    for line in input.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{var_name}}}");
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(CaravanError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using the CARAVAN_* prefix
///
/// Environment variables follow the pattern: CARAVAN_<SECTION>_<KEY>
/// For example: CARAVAN_SERVER_BIND_ADDR, CARAVAN_EXPORT_CHUNK_SIZE
fn apply_env_overrides(config: &mut CaravanConfig) {
    if let Ok(val) = std::env::var("CARAVAN_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("CARAVAN_SERVER_BIND_ADDR") {
        config.server.bind_addr = val;
    }
    if let Ok(val) = std::env::var("CARAVAN_EXPORT_OUTPUT_DIR") {
        config.export.output_dir = val;
    }
    if let Ok(val) = std::env::var("CARAVAN_EXPORT_SPOOL_DIR") {
        config.export.spool_dir = val;
    }
    if let Ok(val) = std::env::var("CARAVAN_EXPORT_CHUNK_SIZE") {
        if let Ok(parsed) = val.parse() {
            config.export.chunk_size = parsed;
        }
    }
    if let Ok(val) = std::env::var("CARAVAN_RETRY_MAX_ATTEMPTS") {
        if let Ok(parsed) = val.parse() {
            config.retry.max_attempts = parsed;
        }
    }
    if let Ok(val) = std::env::var("CARAVAN_RATE_LIMIT_CAPACITY") {
        if let Ok(parsed) = val.parse() {
            config.rate_limit.capacity = parsed;
        }
    }
}
