// Configuration loader
//
// Reads .ai-review.toml from the repository root (or an explicit path).
// A missing default file is fine — defaults apply; a file that exists but
// does not parse is an error the operator should see, not a silent reset.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::settings::ReviewConfig;

pub const DEFAULT_CONFIG_FILE: &str = ".ai-review.toml";

pub fn load_config(path: Option<&Path>) -> Result<ReviewConfig> {
    if let Some(path) = path {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        return read_config(path);
    }

    // Repository config first, then a per-user fallback.
    let repo_config = Path::new(DEFAULT_CONFIG_FILE);
    if repo_config.exists() {
        return read_config(repo_config);
    }
    if let Some(home) = dirs::home_dir() {
        let user_config = home.join(".magpie").join("review.toml");
        if user_config.exists() {
            return read_config(&user_config);
        }
    }

    info!(
        "No {} found, using default configuration",
        DEFAULT_CONFIG_FILE
    );
    Ok(ReviewConfig::default())
}

fn read_config(path: &Path) -> Result<ReviewConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ReviewConfig = toml::from_str(&contents)
        .with_context(|| format!("Invalid config file {}", path.display()))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}
