//! SQLite backend.
//!
//! A database is a file: creating it creates the file, dropping it removes
//! the file. Each revision runs in its own transaction together with the
//! version table update, so a failing revision leaves no trace.

use crate::engine::Connection;
use crate::schema::{ColumnInfo, IndexInfo, SchemaSnapshot, TableSchema};
use crate::uri::DatabaseUri;
use crate::Error;
use rusqlite::OpenFlags;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

fn database_path(uri: &DatabaseUri) -> Result<PathBuf, Error> {
    uri.require_persistent()?;
    Ok(uri.sqlite_path().unwrap_or_default())
}

pub(crate) fn connect(uri: &DatabaseUri) -> Result<Connection, Error> {
    // No CREATE flag: connecting must not silently create the database.
    let conn = rusqlite::Connection::open_with_flags(
        database_path(uri)?,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(Connection::Sqlite(conn))
}

pub(crate) fn database_exists(uri: &DatabaseUri) -> Result<bool, Error> {
    Ok(database_path(uri)?.is_file())
}

pub(crate) fn create_database(uri: &DatabaseUri) -> Result<(), Error> {
    let path = database_path(uri)?;
    // An empty file is a valid, empty SQLite database.
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)?;
    Ok(())
}

pub(crate) fn drop_database(uri: &DatabaseUri) -> Result<(), Error> {
    let path = database_path(uri)?;
    fs::remove_file(&path)?;
    for suffix in ["-journal", "-wal", "-shm"] {
        let _ = fs::remove_file(sidecar(&path, suffix));
    }
    Ok(())
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    name.into()
}

pub(crate) fn execute(conn: &mut rusqlite::Connection, sql: &str) -> Result<(), Error> {
    conn.execute_batch(sql)?;
    Ok(())
}

pub(crate) fn version_table_exists(
    conn: &mut rusqlite::Connection,
    table: &str,
) -> Result<bool, Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn create_version_table(
    conn: &mut rusqlite::Connection,
    table: &str,
) -> Result<(), Error> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                version_num VARCHAR(32) NOT NULL,
                CONSTRAINT {table}_pkc PRIMARY KEY (version_num)
            )"
        ),
        [],
    )?;
    Ok(())
}

pub(crate) fn read_version_table(
    conn: &mut rusqlite::Connection,
    table: &str,
) -> Result<Vec<String>, Error> {
    let mut stmt = conn.prepare(&format!("SELECT version_num FROM {}", table))?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(versions)
}

pub(crate) fn run_step(
    conn: &mut rusqlite::Connection,
    sql: &str,
    table: &str,
    heads: &[String],
) -> Result<(), Error> {
    let tx = conn.transaction()?;
    tx.execute_batch(sql)?;
    tx.execute(&format!("DELETE FROM {}", table), [])?;
    for head in heads {
        tx.execute(
            &format!("INSERT INTO {} (version_num) VALUES (?1)", table),
            [head],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub(crate) fn capture_schema(
    conn: &mut rusqlite::Connection,
    exclude_table: &str,
) -> Result<SchemaSnapshot, Error> {
    let mut tables = BTreeMap::new();

    // Get all user tables (exclude sqlite internal tables and the version table)
    let table_names: Vec<String> = conn
        .prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != ?1 ORDER BY name",
        )?
        .query_map([exclude_table], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    for table_name in table_names {
        let columns = get_columns(conn, &table_name)?;
        let indexes = get_indexes(conn, &table_name)?;
        tables.insert(table_name, TableSchema { columns, indexes });
    }

    Ok(SchemaSnapshot { tables })
}

fn get_columns(conn: &rusqlite::Connection, table_name: &str) -> Result<Vec<ColumnInfo>, Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table_name))?;
    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                type_name: row.get(2)?,
                not_null: row.get::<_, i32>(3)? != 0,
                default_value: row.get(4)?,
                primary_key: row.get::<_, i32>(5)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn get_indexes(conn: &rusqlite::Connection, table_name: &str) -> Result<Vec<IndexInfo>, Error> {
    // Automatic indexes (primary keys, UNIQUE constraints) have no sql.
    let named: Vec<(String, String)> = conn
        .prepare(
            "SELECT name, sql FROM sqlite_master WHERE type='index' AND tbl_name=?1 AND sql IS NOT NULL ORDER BY name",
        )?
        .query_map([table_name], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut indexes = Vec::with_capacity(named.len());
    for (name, sql) in named {
        let columns = conn
            .prepare(&format!("PRAGMA index_info(\"{}\")", name))?
            .query_map([], |row| row.get::<_, String>(2))?
            .collect::<Result<Vec<_>, _>>()?;
        indexes.push(IndexInfo {
            name,
            unique: sql.trim_start().to_ascii_uppercase().starts_with("CREATE UNIQUE"),
            columns,
        });
    }
    Ok(indexes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_uri(dir: &Path, name: &str) -> DatabaseUri {
        DatabaseUri::parse(&format!("sqlite:///{}", dir.join(name).display())).unwrap()
    }

    #[test]
    fn create_and_drop_file() {
        let dir = tempfile::tempdir().unwrap();
        let uri = file_uri(dir.path(), "app.db");

        assert!(!database_exists(&uri).unwrap());
        create_database(&uri).unwrap();
        assert!(database_exists(&uri).unwrap());

        // creating twice fails, like CREATE DATABASE on a server
        assert!(matches!(create_database(&uri), Err(Error::Io(_))));

        drop_database(&uri).unwrap();
        assert!(!database_exists(&uri).unwrap());
        assert!(matches!(drop_database(&uri), Err(Error::Io(_))));
    }

    #[test]
    fn in_memory_databases_are_rejected() {
        for raw in ["sqlite://", "sqlite:///:memory:"] {
            let uri = DatabaseUri::parse(raw).unwrap();
            assert!(matches!(connect(&uri), Err(Error::Config(_))));
            assert!(matches!(database_exists(&uri), Err(Error::Config(_))));
            assert!(matches!(create_database(&uri), Err(Error::Config(_))));
            assert!(matches!(drop_database(&uri), Err(Error::Config(_))));
        }
    }

    #[test]
    fn failed_step_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let uri = file_uri(dir.path(), "app.db");
        create_database(&uri).unwrap();
        #[allow(irrefutable_let_patterns)]
        let Connection::Sqlite(mut conn) = connect(&uri).unwrap() else {
            unreachable!()
        };
        create_version_table(&mut conn, "alembic_version").unwrap();

        let result = run_step(
            &mut conn,
            "CREATE TABLE t (id INTEGER PRIMARY KEY);\nTHIS IS NOT SQL;",
            "alembic_version",
            &["abc".to_string()],
        );
        assert!(result.is_err());
        assert!(read_version_table(&mut conn, "alembic_version")
            .unwrap()
            .is_empty());
        assert!(!version_table_exists(&mut conn, "t").unwrap());
    }

    #[test]
    fn step_rewrites_version_table() {
        let dir = tempfile::tempdir().unwrap();
        let uri = file_uri(dir.path(), "app.db");
        create_database(&uri).unwrap();
        #[allow(irrefutable_let_patterns)]
        let Connection::Sqlite(mut conn) = connect(&uri).unwrap() else {
            unreachable!()
        };
        create_version_table(&mut conn, "alembic_version").unwrap();

        run_step(&mut conn, "", "alembic_version", &["a".to_string(), "b".to_string()]).unwrap();
        let mut versions = read_version_table(&mut conn, "alembic_version").unwrap();
        versions.sort();
        assert_eq!(versions, vec!["a", "b"]);

        run_step(&mut conn, "", "alembic_version", &["c".to_string()]).unwrap();
        assert_eq!(
            read_version_table(&mut conn, "alembic_version").unwrap(),
            vec!["c"]
        );
    }

    #[test]
    fn step_runs_trigger_bodies_as_one_statement() {
        let dir = tempfile::tempdir().unwrap();
        let uri = file_uri(dir.path(), "app.db");
        create_database(&uri).unwrap();
        #[allow(irrefutable_let_patterns)]
        let Connection::Sqlite(mut conn) = connect(&uri).unwrap() else {
            unreachable!()
        };
        create_version_table(&mut conn, "alembic_version").unwrap();

        run_step(
            &mut conn,
            "CREATE TABLE account (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TRIGGER account_name AFTER INSERT ON account BEGIN
                 UPDATE account SET name = 'x' WHERE id = NEW.id;
             END;",
            "alembic_version",
            &["abc".to_string()],
        )
        .unwrap();

        conn.execute("INSERT INTO account (id) VALUES (1)", []).unwrap();
        let name: String = conn
            .query_row("SELECT name FROM account WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "x");
    }
}
