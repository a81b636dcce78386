//! User configuration.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

/// Directory under the user's home holding trainsh files.
pub const USER_CONF_DIR: &str = ".trainsh";

/// Config error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Settings loaded from `~/.trainsh/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Local program used by `!read`.
    pub pager: String,
    /// Local program used by `!edit`.
    pub editor: String,
}

impl Default for Config {
    fn default() -> Self {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            log_level: "info".to_string(),
            pager: env("PAGER").unwrap_or_else(|| "less".to_string()),
            editor: env("EDITOR")
                .or_else(|| env("VISUAL"))
                .unwrap_or_else(|| "vi".to_string()),
        }
    }
}

impl Config {
    /// Default location, if a home directory is known.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(USER_CONF_DIR).join("config.toml"))
    }

    /// Load from `path`, or the default location. A missing file yields defaults.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Ok(Self::default());
        };

        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Toml { path, source })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let file = write_config("pager = \"more\"\n");
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.pager, "more");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.editor, Config::default().editor);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let file = write_config("colour = true\n");
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }
}
