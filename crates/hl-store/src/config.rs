use std::path::{Path, PathBuf};
use std::{env, fs};

use hl_core::EngineConfig;

use crate::error::{Result, StoreError};

pub const DATA_DIR_ENV: &str = "HL_DATA_DIR";
pub const CONFIG_FILE: &str = "config.toml";
pub const DB_FILE: &str = "progression.db";

/// Default base directory for all hl storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".habit-levels")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// `$HL_DATA_DIR` when set and non-empty, else `~/.habit-levels`.
pub fn data_dir() -> PathBuf {
    match env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => default_base_dir(),
    }
}

pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE)
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Parse an engine config from TOML. Missing keys take their defaults.
pub fn parse_config(content: &str) -> Result<EngineConfig> {
    toml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))
}

/// Load the config file at `path`. A missing file yields defaults; an
/// unreadable or malformed one is an error.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(EngineConfig::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
    let config = parse_config(&content)?;
    tracing::debug!(
        path = %path.display(),
        domains = config.domains.len(),
        "loaded config"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = parse_config(
            r#"
            [decay]
            weekly_decay_rate = 0.1

            [domains]
            "C-03-001" = "Reading"
            "#,
        )
        .unwrap();
        assert_eq!(config.decay.weekly_decay_rate, 0.1);
        assert_eq!(config.decay.grace_period_days, 14);
        assert_eq!(config.suggestions.divergence_threshold, 25);
        assert!(config.domains.contains("C-03-001"));
        assert!(config.domains.contains("000"));
    }

    #[test]
    fn test_malformed_is_config_error() {
        let err = parse_config("[decay]\nweekly_decay_rate = \"lots\"").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = config_path(dir.path());
        fs::write(&path, "[server]\nport = 9000\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_paths() {
        let base = Path::new("/tmp/hl");
        assert_eq!(db_path(base), PathBuf::from("/tmp/hl/progression.db"));
        assert_eq!(config_path(base), PathBuf::from("/tmp/hl/config.toml"));
        assert!(default_base_dir().ends_with(".habit-levels"));
    }
}
