//! Migration tool configuration.

use crate::Error;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Option naming the folder that holds the migration scripts.
pub const SCRIPT_LOCATION: &str = "script_location";

/// Option naming the database the migrations run against.
pub const SQLALCHEMY_URL: &str = "sqlalchemy.url";

/// A set of named string options consumed by the migration commands.
///
/// Only [SCRIPT_LOCATION] and [SQLALCHEMY_URL] are read by this crate; any
/// other option is carried along untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    main_options: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_main_option(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.main_options.insert(name.into(), value.into());
    }

    pub fn get_main_option(&self, name: &str) -> Option<&str> {
        self.main_options.get(name).map(String::as_str)
    }

    /// Get an option that must be present, failing with a configuration error otherwise.
    pub fn require_main_option(&self, name: &str) -> Result<&str, Error> {
        match self.get_main_option(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(Error::Config(format!(
                "No '{}' option is set in the configuration",
                name
            ))),
        }
    }

    /// The script folder, as configured. Existence is not checked here.
    pub fn script_location(&self) -> Result<PathBuf, Error> {
        self.require_main_option(SCRIPT_LOCATION).map(PathBuf::from)
    }

    /// The database URL, as configured.
    pub fn url(&self) -> Result<&str, Error> {
        self.require_main_option(SQLALCHEMY_URL)
    }
}

/// Create a [Config] pointing the migration tool at `folder` and the database at `uri`.
///
/// No validation happens here: a missing folder surfaces as an error once a
/// command tries to read it.
pub fn make_alembic_config(uri: &str, folder: impl AsRef<Path>) -> Config {
    let mut config = Config::new();
    config.set_main_option(SCRIPT_LOCATION, folder.as_ref().to_string_lossy());
    config.set_main_option(SQLALCHEMY_URL, uri);
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_alembic_config_sets_both_options() {
        let cases = [
            ("mysql://root:@localhost/app", "migrations"),
            ("postgresql://u:p@db:5432/x", "/srv/app/alembic"),
            ("sqlite:////tmp/app.db", "./relative/dir"),
        ];
        for (uri, folder) in cases {
            let config = make_alembic_config(uri, folder);
            assert_eq!(config.get_main_option(SQLALCHEMY_URL), Some(uri));
            assert_eq!(config.get_main_option(SCRIPT_LOCATION), Some(folder));
            assert_eq!(config.url().unwrap(), uri);
            assert_eq!(config.script_location().unwrap(), PathBuf::from(folder));
        }
    }

    #[test]
    fn missing_option_is_a_config_error() {
        let mut config = Config::new();
        config.set_main_option(SCRIPT_LOCATION, "migrations");
        assert_eq!(
            config.url(),
            Err(Error::Config(
                "No 'sqlalchemy.url' option is set in the configuration".to_string()
            ))
        );

        config.set_main_option(SQLALCHEMY_URL, "");
        assert!(matches!(config.url(), Err(Error::Config(_))));
    }

    #[test]
    fn folder_is_not_validated() {
        let config = make_alembic_config("sqlite://", "/does/not/exist");
        assert_eq!(
            config.script_location().unwrap(),
            PathBuf::from("/does/not/exist")
        );
    }
}
