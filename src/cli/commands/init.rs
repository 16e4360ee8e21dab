//! Init command - writes a starter configuration file

use clap::Args;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where to write the configuration file
    #[arg(short, long, default_value = "caravan.toml")]
    pub output: String,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

const TEMPLATE: &str = r#"# Caravan configuration

[application]
log_level = "info"

[server]
bind_addr = "127.0.0.1:8320"

[export]
output_dir = "exports"
spool_dir = "spool"
chunk_size = 50000
csv_bom = true
# abort: fail on the first malformed row; skip: drop and count them
on_malformed = "abort"

[retry]
base_delay_ms = 250
max_delay_ms = 30000
max_attempts = 5
attempt_timeout_secs = 300
job_timeout_secs = 3600

[rate_limit]
capacity = 10
refill_per_sec = 1.0

[idempotency]
ttl_hours = 24

[logging]
local_enabled = false
local_path = "logs"
local_rotation = "daily"
"#;

impl InitArgs {
    /// Writes the starter configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn execute(&self) -> anyhow::Result<i32> {
        let path = Path::new(&self.output);
        if path.exists() && !self.force {
            eprintln!(
                "✗ {} already exists (use --force to overwrite)",
                path.display()
            );
            return Ok(2);
        }
        std::fs::write(path, TEMPLATE)?;
        println!("✓ Wrote {}", path.display());
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_is_valid_config() {
        let parsed: crate::config::CaravanConfig = toml::from_str(TEMPLATE).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.export.chunk_size, 50_000);
    }
}
