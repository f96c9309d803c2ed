use std::{fs, path::PathBuf};

use common::prelude::Config;

pub const APP_NAME: &str = "pulse";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the pulse directory (~/.pulse)
    pub pulse_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded, normalized configuration
    pub config: Config,
}

impl AppState {
    /// Get the pulse directory path (custom or default ~/.pulse)
    pub fn pulse_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Write a config file into a (possibly new) pulse directory
    ///
    /// Refuses to overwrite an existing config file.
    pub fn init(custom_path: Option<PathBuf>, config: Option<Config>) -> Result<Self, StateError> {
        let pulse_dir = Self::pulse_dir(custom_path)?;
        let config_path = pulse_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            return Err(StateError::AlreadyInitialized(config_path));
        }

        fs::create_dir_all(&pulse_dir)?;

        let config = config.unwrap_or_default();
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            pulse_dir,
            config_path,
            config,
        })
    }

    /// Load existing state from the pulse directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let pulse_dir = Self::pulse_dir(custom_path)?;
        let config_path = pulse_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&config_toml)?;

        Ok(Self {
            pulse_dir,
            config_path,
            config: config.normalized(),
        })
    }

    /// The configured settings, or the built-in defaults when no config
    /// file has been written yet
    pub fn load_config(custom_path: Option<PathBuf>) -> Result<Config, StateError> {
        match Self::load(custom_path) {
            Ok(state) => Ok(state.config),
            Err(StateError::NotInitialized) => Ok(Config::default()),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("pulse directory not initialized. Run 'pulse init' first")]
    NotInitialized,

    #[error("config already exists at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("could not determine home directory")]
    NoHomeDirectory,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");

        let state = AppState::init(Some(path.clone()), None).unwrap();
        assert!(state.config_path.exists());

        let loaded = AppState::load(Some(path)).unwrap();
        assert_eq!(loaded.config, Config::default());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        fs::write(path.join(CONFIG_FILE_NAME), "history_limit = 9\n").unwrap();

        let result = AppState::init(Some(path.clone()), None);
        assert!(matches!(result, Err(StateError::AlreadyInitialized(_))));

        let untouched = fs::read_to_string(path.join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(untouched, "history_limit = 9\n");
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nothing-here");

        assert!(matches!(
            AppState::load(Some(path.clone())),
            Err(StateError::NotInitialized)
        ));
        assert_eq!(AppState::load_config(Some(path)).unwrap(), Config::default());
    }

    #[test]
    fn test_load_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        fs::write(
            path.join(CONFIG_FILE_NAME),
            "relays = []\nhistory_limit = 0\nuser_secret = \"\"\ndefault_username = \"bob\"\n",
        )
        .unwrap();

        let config = AppState::load_config(Some(path)).unwrap();
        assert_eq!(config.relays.len(), 3);
        assert_eq!(config.history_limit, 5);
        assert_eq!(config.user_secret, "super-secret-key");
        assert_eq!(config.default_username.as_deref(), Some("bob"));
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        fs::write(path.join(CONFIG_FILE_NAME), "history_limit = \"many\"\n").unwrap();

        assert!(matches!(
            AppState::load_config(Some(path)),
            Err(StateError::TomlDe(_))
        ));
    }
}
