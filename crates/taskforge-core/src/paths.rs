//! Centralized path utilities
//!
//! All application paths in one place for consistency

use std::path::PathBuf;

const CONFIG_DIR_NAME: &str = ".taskforge";

/// Get the taskforge config directory (~/.taskforge)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.taskforge/config.toml)
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the logs directory (~/.taskforge/logs)
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Get the default session snapshot (~/.taskforge/sessions.json)
pub fn sessions_file() -> PathBuf {
    config_dir().join("sessions.json")
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_file_lives_in_config_dir() {
        assert!(sessions_file().starts_with(config_dir()));
        assert!(logs_dir().ends_with("logs"));
    }

    #[test]
    fn expand_home_leaves_plain_paths_alone() {
        assert_eq!(expand_home("/tmp/x.json"), PathBuf::from("/tmp/x.json"));
        assert_eq!(expand_home("rel/x.json"), PathBuf::from("rel/x.json"));
    }
}
