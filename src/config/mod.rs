// Configuration module
// Public interface for configuration loading

mod loader;
mod settings;

pub use loader::{load_config, DEFAULT_CONFIG_FILE};
pub use settings::{
    CacheSettings, ExclusionRules, ProviderConfig, ReviewConfig, ReviewSettings,
};
