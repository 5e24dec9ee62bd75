// Configuration loading and parsing (futsal.toml).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::division::DEFAULT_ATTEMPT_BUDGET;

/// Config file looked up in the working directory when no path is given.
pub const CONFIG_FILE: &str = "futsal.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// futsal.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub division: DivisionConfig,
    pub database: DatabaseConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DivisionConfig {
    /// Random attempts per division before reporting the groups unsatisfiable.
    pub attempt_budget: usize,
    pub default_team_count: usize,
}

impl Default for DivisionConfig {
    fn default() -> Self {
        DivisionConfig {
            attempt_budget: DEFAULT_ATTEMPT_BUDGET,
            default_team_count: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. Defaults to the platform data directory.
    pub path: Option<String>,
}

/// Shared-secret gate for destructive actions. Not a security boundary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub password: Option<String>,
}

impl Config {
    /// Database location: the configured path, or `futsal.db` under the
    /// platform data directory.
    pub fn db_path(&self) -> PathBuf {
        match &self.database.path {
            Some(path) => PathBuf::from(path),
            None => default_db_path(),
        }
    }

    /// Admin actions are open when no password is configured.
    pub fn check_admin_password(&self, attempt: &str) -> bool {
        match &self.admin.password {
            Some(password) => password == attempt,
            None => true,
        }
    }
}

pub fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "futsal")
        .map(|dirs| dirs.data_dir().join("futsal.db"))
        .unwrap_or_else(|| PathBuf::from("futsal.db"))
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate the config file at `path`. The file must exist.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    validate(&config)?;
    Ok(config)
}

/// Load an explicitly requested file, or `futsal.toml` from the working
/// directory if present, or fall back to defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = path {
        return load_config_from(path);
    }
    let default_path = PathBuf::from(CONFIG_FILE);
    if default_path.exists() {
        load_config_from(&default_path)
    } else {
        Ok(Config::default())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.division.attempt_budget == 0 {
        return Err(ConfigError::ValidationError {
            field: "division.attempt_budget".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.division.default_team_count == 0 {
        return Err(ConfigError::ValidationError {
            field: "division.default_team_count".into(),
            message: "must be at least 1".into(),
        });
    }

    if config.admin.password.as_deref() == Some("") {
        return Err(ConfigError::ValidationError {
            field: "admin.password".into(),
            message: "must not be empty; omit it to disable the admin check".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Write `content` to a fresh temp file and return its path.
    fn write_config(test_name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("futsal_config_{test_name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_full_config() {
        let path = write_config(
            "full",
            r#"
            [division]
            attempt_budget = 250
            default_team_count = 3

            [database]
            path = "squad.db"

            [admin]
            password = "kickoff"
            "#,
        );
        let config = load_config_from(&path).expect("should load valid config");

        assert_eq!(config.division.attempt_budget, 250);
        assert_eq!(config.division.default_team_count, 3);
        assert_eq!(config.db_path(), PathBuf::from("squad.db"));
        assert!(config.check_admin_password("kickoff"));
        assert!(!config.check_admin_password("offside"));
    }

    #[test]
    fn missing_sections_use_defaults() {
        let path = write_config("partial", "[division]\ndefault_team_count = 4\n");
        let config = load_config_from(&path).unwrap();
        assert_eq!(config.division.attempt_budget, DEFAULT_ATTEMPT_BUDGET);
        assert_eq!(config.division.default_team_count, 4);
        assert!(config.database.path.is_none());
        assert!(config.check_admin_password("anything"));
    }

    #[test]
    fn missing_file_is_reported() {
        let path = std::env::temp_dir().join("futsal_config_missing/nope.toml");
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let path = write_config("invalid", "[division\nattempt_budget = ");
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn zero_budget_fails_validation() {
        let path = write_config("zero_budget", "[division]\nattempt_budget = 0\n");
        let err = load_config_from(&path).unwrap_err();
        match err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "division.attempt_budget")
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn empty_password_fails_validation() {
        let path = write_config("empty_password", "[admin]\npassword = \"\"\n");
        assert!(matches!(
            load_config_from(&path),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn default_db_path_ends_with_file_name() {
        assert!(default_db_path().ends_with("futsal.db"));
    }
}
