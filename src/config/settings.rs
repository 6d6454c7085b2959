// Configuration structs
//
// Every section is serde-defaulted so a partial config file only overrides
// what it names.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Master switch; a disabled reviewer exits without doing anything.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub exclusions: ExclusionRules,

    #[serde(default)]
    pub review: ReviewSettings,

    #[serde(default)]
    pub cache: CacheSettings,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: ProviderConfig::default(),
            exclusions: ExclusionRules::default(),
            review: ReviewSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

/// AI provider settings. The API key is read from the environment
/// (`OPENROUTER_API_KEY`), never from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Path-based exclusion rules, checked before any review cost is incurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionRules {
    #[serde(default = "default_excluded_directories")]
    pub directories: Vec<String>,

    #[serde(default = "default_excluded_prefixes")]
    pub file_prefixes: Vec<String>,

    #[serde(default = "default_excluded_patterns")]
    pub file_patterns: Vec<String>,
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self {
            directories: default_excluded_directories(),
            file_prefixes: default_excluded_prefixes(),
            file_patterns: default_excluded_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSettings {
    /// Diffs longer than this are skipped outright.
    #[serde(default = "default_max_diff_bytes")]
    pub max_diff_bytes: usize,

    /// Files per AI review call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Run the evidence-based verification pass on critical/major issues.
    #[serde(default = "default_true")]
    pub verify_high_severity: bool,

    /// Opt-in third pass: resubmit high-severity issues plus evidence to the
    /// AI for a confirm/dismiss verdict.
    #[serde(default)]
    pub reverify_with_ai: bool,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            max_diff_bytes: default_max_diff_bytes(),
            batch_size: default_batch_size(),
            verify_high_severity: true,
            reverify_with_ai: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,

    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_days: default_ttl_days(),
            dir: default_cache_dir(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4.5".to_string()
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_diff_bytes() -> usize {
    10_000
}

fn default_batch_size() -> usize {
    7
}

fn default_ttl_days() -> i64 {
    7
}

fn default_cache_dir() -> String {
    ".review_cache".to_string()
}

fn default_excluded_directories() -> Vec<String> {
    [
        "node_modules",
        "vendor",
        "dist",
        "build",
        ".git",
        "__pycache__",
        ".pytest_cache",
        "coverage",
        "venv",
        "env",
        ".venv",
        "migrations",
        "target",
        "bin",
        "obj",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_excluded_prefixes() -> Vec<String> {
    [
        "test_",
        "_test",
        ".min.",
        "bundle.",
        "vendor.",
        "legacy_",
        "deprecated_",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_excluded_patterns() -> Vec<String> {
    [
        "*.lock",
        "*.log",
        "*.pyc",
        "*.pyo",
        "*.so",
        "*.dylib",
        "*.dll",
        "*.exe",
        "*.o",
        "*.a",
        "package-lock.json",
        "yarn.lock",
        "poetry.lock",
        "Pipfile.lock",
        "Gemfile.lock",
        "*.min.js",
        "*.min.css",
        "*.map",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
