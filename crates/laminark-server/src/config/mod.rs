// crates/laminark-server/src/config/mod.rs
// Configuration and shared constants

pub mod env;
pub mod file;

pub use env::EnvConfig;
pub use file::{LaminarkConfig, TopicDetectionConfig, TopicPreset};

use std::path::PathBuf;

/// Resolve the Laminark data directory (~/.laminark by default,
/// LAMINARK_DATA_DIR override).
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LAMINARK_DATA_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    let home = dirs::home_dir().unwrap_or_else(|| {
        tracing::warn!(
            "HOME directory not set -- using current directory for Laminark data"
        );
        PathBuf::from(".")
    });
    home.join(".laminark")
}

/// Path of the single database file.
pub fn db_path() -> PathBuf {
    data_dir().join("laminark.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_path_lives_under_data_dir() {
        let db = db_path();
        assert!(db.starts_with(data_dir()));
        assert_eq!(db.file_name().and_then(|n| n.to_str()), Some("laminark.db"));
    }
}
