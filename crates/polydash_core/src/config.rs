//! TOML configuration for embedding processes and the CLI.
//!
//! ```toml
//! installed_namespaces = ["locations", "reporters"]
//!
//! [database]
//! path = "/var/lib/polydash/polydash.db"
//!
//! [logging]
//! level = "info"
//! dir = "/var/log/polydash"
//! ```
//!
//! Every section is optional. Without `[database] path` the database lives
//! in memory; without `[logging] dir` no log backend is started.

use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::extension::registry::ExtensionRegistry;
use crate::extension::ExtensionError;
use crate::logging::{default_log_level, init_logging};
use crate::model::is_valid_identifier;
use rusqlite::Connection;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Namespaces in installation order; discovery follows this order.
    pub installed_namespaces: Vec<String>,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub dir: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

impl CoreConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self
            .installed_namespaces
            .iter()
            .find(|namespace| !is_valid_identifier(namespace))
        {
            return Err(ConfigError::Invalid(format!(
                "namespace `{bad}` is not a valid identifier"
            )));
        }
        if let Some(dir) = &self.logging.dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "logging.dir must be absolute, got `{}`",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(default_log_level())
    }

    /// Starts logging when `[logging] dir` is set.
    pub fn init_logging(&self) -> Result<(), ConfigError> {
        match &self.logging.dir {
            Some(dir) => init_logging(self.log_level(), dir).map_err(ConfigError::Invalid),
            None => Ok(()),
        }
    }

    pub fn extension_registry(&self) -> Result<ExtensionRegistry, ExtensionError> {
        ExtensionRegistry::new(self.installed_namespaces.iter().cloned())
    }

    pub fn open_database(&self) -> DbResult<Connection> {
        match &self.database.path {
            Some(path) => open_db(path),
            None => open_db_in_memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig};
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn empty_config_uses_defaults() {
        let config = CoreConfig::from_toml_str("").unwrap();
        assert!(config.installed_namespaces.is_empty());
        assert!(config.database.path.is_none());
        assert!(config.init_logging().is_ok());
    }

    #[test]
    fn parses_all_sections() {
        let config = CoreConfig::from_toml_str(
            r#"
installed_namespaces = ["reporters", "locations"]

[database]
path = "/tmp/polydash.db"

[logging]
level = "warn"
"#,
        )
        .unwrap();
        assert_eq!(config.installed_namespaces, vec!["reporters", "locations"]);
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/polydash.db")));
        assert_eq!(config.log_level(), "warn");
        let registry = config.extension_registry().unwrap();
        assert_eq!(registry.installed_namespaces(), vec!["reporters", "locations"]);
    }

    #[test]
    fn rejects_invalid_values_and_unknown_keys() {
        assert!(matches!(
            CoreConfig::from_toml_str(r#"installed_namespaces = ["bad.name"]"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CoreConfig::from_toml_str("[logging]\ndir = \"relative/logs\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CoreConfig::from_toml_str("plugins = []"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_file_and_reports_missing_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "installed_namespaces = [\"locations\"]").unwrap();
        let config = CoreConfig::load(file.path()).unwrap();
        assert_eq!(config.installed_namespaces, vec!["locations"]);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            CoreConfig::load(missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
