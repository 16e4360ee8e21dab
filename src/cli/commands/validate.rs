//! Validate-config command

use crate::config::CaravanConfig;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Loads and validates the configuration file
    ///
    /// # Errors
    ///
    /// Never returns `Err`; validation problems map to a non-zero exit code.
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        match CaravanConfig::from_file(config_path) {
            Ok(config) => {
                println!("✓ Configuration is valid: {config_path}");
                println!("  output_dir:  {}", config.export.output_dir);
                println!("  spool_dir:   {}", config.export.spool_dir);
                println!("  chunk_size:  {}", config.export.chunk_size);
                println!("  bind_addr:   {}", config.server.bind_addr);
                Ok(0)
            }
            Err(e) => {
                eprintln!("✗ Configuration is invalid: {e}");
                Ok(2)
            }
        }
    }
}
