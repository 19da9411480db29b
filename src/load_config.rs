use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::config::AppConfig;

/// Loads the static YAML config file (no secrets) and applies environment
/// overrides. Returns a fully merged [`AppConfig`] or an error.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read config file {:?}", path_ref))?;

    let mut config: AppConfig = match serde_yaml::from_str(&config_content) {
        Ok(config) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            config
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    // The deployment prefix varies per environment, so the environment wins
    // over the file.
    if let Ok(prefix) = std::env::var("TX_PREFIX") {
        info!(prefix = %prefix, "TX_PREFIX found in env, overriding config");
        config.prefix = prefix;
    }

    config.trace_loaded();
    Ok(config)
}
