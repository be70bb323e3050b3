//! rstest fixtures for migration tests.
//!
//! Bring them into scope with `use alembic_verify::fixtures::*;` and ask for
//! them by name:
//!
//! ```rust,ignore
//! use alembic_verify::fixtures::*;
//! use alembic_verify::{command, Config, TemporaryDatabase};
//! use rstest::rstest;
//!
//! #[rstest]
//! fn upgrades_cleanly(new_db_left: TemporaryDatabase, alembic_config_left: Config) {
//!     command::upgrade(&alembic_config_left, "head").unwrap();
//! }
//! ```
//!
//! The base URI comes from `ALEMBIC_VERIFY_DB_URI` and the migration folder
//! from `ALEMBIC_VERIFY_ROOT` (default `<crate>/migrations`).
//!
//! `uri_left` and `uri_right` are derived once per test: every fixture of one
//! test that depends on `uri_left` sees the same temporary database, and
//! two tests never share one. The derived names are remembered per test
//! thread, which is how the standard test harness runs each test.

use crate::config::{make_alembic_config, Config};
use crate::database::TemporaryDatabase;
use crate::uri::get_temporary_uri;
use rstest::fixture;
use std::cell::RefCell;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

pub const DB_URI_ENV: &str = "ALEMBIC_VERIFY_DB_URI";
pub const ROOT_ENV: &str = "ALEMBIC_VERIFY_ROOT";
pub const DEFAULT_DB_URI: &str = "mysql://root:@localhost/alembicverify";

thread_local! {
    static TEMPORARY_URIS: RefCell<HashMap<(&'static str, String), String>> =
        RefCell::new(HashMap::new());
}

fn temporary_uri_for(side: &'static str, db_uri: &str) -> String {
    TEMPORARY_URIS.with(|uris| {
        uris.borrow_mut()
            .entry((side, db_uri.to_string()))
            .or_insert_with(|| {
                get_temporary_uri(db_uri)
                    .unwrap_or_else(|e| panic!("invalid base database URI '{}': {}", db_uri, e))
            })
            .clone()
    })
}

/// Base database URI the temporary databases are derived from.
#[fixture]
pub fn db_uri() -> String {
    env::var(DB_URI_ENV).unwrap_or_else(|_| DEFAULT_DB_URI.to_string())
}

/// Folder holding the migration scripts.
#[fixture]
pub fn alembic_root() -> PathBuf {
    if let Ok(root) = env::var(ROOT_ENV) {
        return PathBuf::from(root);
    }
    env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join("migrations")
}

#[fixture]
pub fn uri_left(db_uri: String) -> String {
    temporary_uri_for("left", &db_uri)
}

#[fixture]
pub fn uri_right(db_uri: String) -> String {
    temporary_uri_for("right", &db_uri)
}

#[fixture]
pub fn alembic_config_left(uri_left: String, alembic_root: PathBuf) -> Config {
    make_alembic_config(&uri_left, alembic_root)
}

#[fixture]
pub fn alembic_config_right(uri_right: String, alembic_root: PathBuf) -> Config {
    make_alembic_config(&uri_right, alembic_root)
}

/// A fresh database at `uri_left`, destroyed when the test ends.
#[fixture]
pub fn new_db_left(uri_left: String) -> TemporaryDatabase {
    TemporaryDatabase::create(uri_left.clone())
        .unwrap_or_else(|e| panic!("failed to create database '{}': {}", uri_left, e))
}

/// A fresh database at `uri_right`, destroyed when the test ends.
#[fixture]
pub fn new_db_right(uri_right: String) -> TemporaryDatabase {
    TemporaryDatabase::create(uri_right.clone())
        .unwrap_or_else(|e| panic!("failed to create database '{}': {}", uri_right, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_and_right_are_stable_within_a_test() {
        let base = "mysql://root:@localhost/app";
        let left = temporary_uri_for("left", base);
        assert_eq!(left, temporary_uri_for("left", base));
        assert_ne!(left, temporary_uri_for("right", base));
        assert!(left.starts_with("mysql://root:@localhost/app_test_"));
    }

    #[test]
    fn left_differs_between_tests() {
        let base = "mysql://root:@localhost/app";
        let here = temporary_uri_for("left", base);
        let elsewhere = std::thread::spawn(move || temporary_uri_for("left", base))
            .join()
            .unwrap();
        assert_ne!(here, elsewhere);
    }

    #[test]
    fn config_fixtures_point_at_their_uri() {
        let config = alembic_config_left(
            "sqlite:///left.db".to_string(),
            PathBuf::from("/srv/migrations"),
        );
        assert_eq!(config.url().unwrap(), "sqlite:///left.db");
        assert_eq!(
            config.script_location().unwrap(),
            PathBuf::from("/srv/migrations")
        );
    }
}
