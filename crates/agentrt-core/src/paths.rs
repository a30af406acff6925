//! Centralized path utilities, mirroring the teacher's single-module
//! convention for filesystem locations.

use std::path::PathBuf;

const CONFIG_DIR_NAME: &str = ".agentrt";

/// The runtime's config/state directory (`~/.agentrt`).
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Default location of the persisted event store.
pub fn default_db_path() -> PathBuf {
    config_dir().join("events.db")
}

/// Directory policy programs are read from when the config references one
/// by name instead of an inline path.
pub fn policies_dir() -> PathBuf {
    config_dir().join("policies")
}
