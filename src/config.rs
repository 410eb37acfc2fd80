//! Global config for rewind
//! Includes the iteration limit and the REPL history location.
use std::collections::HashMap;

use camino::Utf8PathBuf;
use config::{Config, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::Deserialize;

/// Global config variable for `Settings`
pub static REWIND_CONFIG: OnceCell<Settings> = OnceCell::new();

/// Global path variable for configuration file
pub static REWIND_CONFIG_FILE: OnceCell<Utf8PathBuf> = OnceCell::new();

/// Gets the `REWIND_CONFIG` settings. If uninitialized, sets the global variable
/// in the following order (greatest to least precedence):
/// - `settings` map if provided, e.g. with key ("limit", "1000000")
/// - Env var per setting, e.g. `REWIND_LIMIT`
/// - Config file, which also has a configurable location (see `rewind_config_file()`),
///   and has the following syntax for e.g. TOML:
///   ```toml
///   limit = 1000000
///   history = "/path/to/history"
///   ```
/// - Default values: no limit, history at `$HOME/.rewind/repl-history`
pub fn rewind_config(
    file: Option<&Utf8PathBuf>,
    settings: Option<&HashMap<&str, String>>,
) -> &'static Settings {
    REWIND_CONFIG.get_or_init(|| {
        Settings::from_config(rewind_config_file(file), settings).unwrap_or_default()
    })
}

/// Gets the `REWIND_CONFIG_FILE` path. If uninitialized, sets the global variable
/// in the following order (greatest to least precedence):
/// - `config_file` parameter if provided
/// - `REWIND_CONFIG_FILE` env var
/// - Default location at `$HOME/.rewind/rewind.toml`
pub fn rewind_config_file(config_file: Option<&Utf8PathBuf>) -> &'static Utf8PathBuf {
    REWIND_CONFIG_FILE.get_or_init(|| {
        if let Some(file) = config_file {
            file.clone()
        } else if let Ok(file) = std::env::var("REWIND_CONFIG_FILE") {
            Utf8PathBuf::from(file)
        } else {
            rewind_default_dir().join("rewind.toml")
        }
    })
}

/// Contains the rewind config settings
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Maximum number of trampoline steps per evaluation; unlimited if absent
    pub limit: Option<usize>,

    /// REPL history file
    pub history: Utf8PathBuf,
}

impl Settings {
    /// Loads config settings from a file or env vars
    /// The limit can also be overriden by a CLI arg
    pub fn from_config(
        config_file: &Utf8PathBuf,
        settings: Option<&HashMap<&str, String>>,
    ) -> Result<Self, ConfigError> {
        let limit = "limit";
        let history = "history";
        // Settings are read first to last, in order of increasing precedence.
        Config::builder()
            .set_default(history, history_default_path().to_string())?
            .add_source(File::with_name(config_file.as_str()).required(false))
            .add_source(Environment::with_prefix("REWIND"))
            .set_override_option(limit, settings.and_then(|s| s.get(limit).cloned()))?
            .set_override_option(history, settings.and_then(|s| s.get(history).cloned()))?
            .build()
            .and_then(|c| c.try_deserialize())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            limit: None,
            history: history_default_path(),
        }
    }
}

/// `$HOME/.rewind`, or `.rewind` under the current directory if there is no
/// usable home directory
pub fn rewind_default_dir() -> Utf8PathBuf {
    home::home_dir()
        .and_then(|home| Utf8PathBuf::from_path_buf(home).ok())
        .unwrap_or_default()
        .join(".rewind")
}

pub fn history_default_path() -> Utf8PathBuf {
    rewind_default_dir().join("repl-history")
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;
    use std::io::prelude::*;
    use std::{collections::HashMap, fs::File};
    use tempfile::Builder;

    use crate::config::{history_default_path, Settings};

    // Doesn't test `OnceCell` behavior as the tests seem to share memory
    #[test]
    fn test_config_file() {
        let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
        let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
        let config_path = tmp_dir.join("rewind.toml");
        let history = tmp_dir.join("history").into_string();

        let mut config_file = File::create(config_path.clone()).unwrap();
        config_file
            .write_all(format!("history = \"{history}\"\n").as_bytes())
            .unwrap();
        config_file.write_all("limit = 5000\n".as_bytes()).unwrap();

        let config = Settings::from_config(&config_path, None).unwrap();

        assert_eq!(config.history, history);
        assert_eq!(config.limit, Some(5000));
    }

    #[test]
    fn test_config_defaults() {
        let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
        let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
        let missing = tmp_dir.join("missing.toml");

        let config = Settings::from_config(&missing, None).unwrap();

        assert_eq!(config.limit, None);
        assert_eq!(config.history, history_default_path());
    }

    // Tests overwriting the config file with a CLI argument
    // Doesn't test env var as it can overwrite other tests when run in parallel
    #[test]
    fn test_config_override() {
        let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
        let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
        let config_path = tmp_dir.join("rewind.toml");

        let mut config_file = File::create(config_path.clone()).unwrap();
        config_file.write_all("limit = 5000\n".as_bytes()).unwrap();

        let mut overrides = HashMap::new();
        overrides.insert("limit", "42".to_string());

        let config = Settings::from_config(&config_path, Some(&overrides)).unwrap();

        assert_eq!(config.limit, Some(42));
    }

    // Tests that duplicate config keys result in an error
    #[test]
    fn test_config_duplicate() {
        let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
        let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
        let config_path = tmp_dir.join("rewind.toml");

        let mut config_file = File::create(config_path.clone()).unwrap();
        config_file.write_all("limit = 1\n".as_bytes()).unwrap();
        config_file.write_all("limit = 2\n".as_bytes()).unwrap();

        assert!(Settings::from_config(&config_path, None).is_err())
    }
}
