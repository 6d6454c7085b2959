// Path exclusion matching
//
// Checked before any review cost is incurred. Patterns are matched against
// both the bare filename and the full path.

use glob::Pattern;
use tracing::warn;

use crate::config::ExclusionRules;

/// Returns the reason a path is excluded, or None when it should be reviewed.
pub fn exclusion_reason(rules: &ExclusionRules, filepath: &str) -> Option<String> {
    let filename = filepath.rsplit('/').next().unwrap_or(filepath);

    for dir in &rules.directories {
        if filepath.split('/').any(|part| part == dir) {
            return Some(format!("in excluded directory: {}", dir));
        }
    }

    for prefix in &rules.file_prefixes {
        if filename.starts_with(prefix.as_str()) {
            return Some(format!("matches excluded prefix: {}", prefix));
        }
    }

    for pattern in &rules.file_patterns {
        match Pattern::new(pattern) {
            Ok(p) => {
                if p.matches(filename) || p.matches(filepath) {
                    return Some(format!("matches excluded pattern: {}", pattern));
                }
            }
            Err(e) => warn!("Ignoring invalid exclusion pattern {:?}: {}", pattern, e),
        }
    }

    None
}
