//! Script folders and SQLite databases for unit tests.

use crate::config::{make_alembic_config, Config};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A temporary migration script folder with a `versions/` directory.
pub struct ScriptFolder {
    dir: TempDir,
}

impl ScriptFolder {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create script folder");
        fs::create_dir(dir.path().join("versions")).expect("failed to create versions dir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self, uri: &str) -> Config {
        make_alembic_config(uri, self.path())
    }
}

pub fn write_script(
    folder: &ScriptFolder,
    file_name: &str,
    revision: &str,
    down_revisions: &[&str],
    upgrade: &str,
    downgrade: &str,
) {
    let down_revision = if down_revisions.is_empty() {
        "None".to_string()
    } else {
        down_revisions.join(", ")
    };
    let contents = format!(
        "-- revision: {revision}\n-- down_revision: {down_revision}\n\n-- upgrade\n{upgrade}\n\n-- downgrade\n{downgrade}\n"
    );
    fs::write(folder.path().join("versions").join(file_name), contents)
        .expect("failed to write script");
}

/// aaa111 -> bbb222 -> ccc333
pub fn linear_history() -> ScriptFolder {
    let folder = ScriptFolder::new();
    write_script(
        &folder,
        "001_account.sql",
        "aaa111",
        &[],
        "CREATE TABLE account (id INTEGER PRIMARY KEY, name VARCHAR(50) NOT NULL);",
        "DROP TABLE account;",
    );
    write_script(
        &folder,
        "002_employee.sql",
        "bbb222",
        &["aaa111"],
        "CREATE TABLE employee (id INTEGER PRIMARY KEY, account_id INTEGER NOT NULL, title VARCHAR(50));",
        "DROP TABLE employee;",
    );
    write_script(
        &folder,
        "003_employee_email.sql",
        "ccc333",
        &["bbb222"],
        "ALTER TABLE employee ADD COLUMN email VARCHAR(100);",
        "ALTER TABLE employee DROP COLUMN email;",
    );
    folder
}

/// base00 -> bra111
///        -> brb222
pub fn branched_history() -> ScriptFolder {
    let folder = ScriptFolder::new();
    write_script(
        &folder,
        "001_base.sql",
        "base00",
        &[],
        "CREATE TABLE account (id INTEGER PRIMARY KEY, name VARCHAR(50) NOT NULL);",
        "DROP TABLE account;",
    );
    write_script(
        &folder,
        "002_branch_a.sql",
        "bra111",
        &["base00"],
        "CREATE TABLE branch_a (id INTEGER PRIMARY KEY);",
        "DROP TABLE branch_a;",
    );
    write_script(
        &folder,
        "003_branch_b.sql",
        "brb222",
        &["base00"],
        "CREATE TABLE branch_b (id INTEGER PRIMARY KEY);",
        "DROP TABLE branch_b;",
    );
    folder
}

/// A SQLite database file inside a temporary directory, created empty.
#[cfg(feature = "sqlite")]
pub struct SqliteDb {
    _dir: TempDir,
    uri: String,
}

#[cfg(feature = "sqlite")]
impl SqliteDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create database dir");
        let uri = format!("sqlite:///{}", dir.path().join("app.db").display());
        crate::database::create_database(&uri).expect("failed to create sqlite database");
        Self { _dir: dir, uri }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}
