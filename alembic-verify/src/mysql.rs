//! MySQL backend.
//!
//! ## DDL Behavior
//!
//! DDL statements (CREATE TABLE, ALTER TABLE, DROP TABLE, etc.) cause an
//! implicit commit in MySQL and cannot be rolled back. A revision's SQL is
//! therefore sent as one multi-statement query outside any transaction; only
//! the version table rewrite that follows it is transactional. If a statement
//! fails partway through a revision, the statements before it stay applied
//! and the version table still names the previous heads.

use crate::engine::Connection;
use crate::schema::{ColumnInfo, IndexInfo, SchemaSnapshot, TableSchema};
use crate::uri::DatabaseUri;
use crate::Error;
use mysql::prelude::*;
use mysql::{Conn, Opts, TxOpts};
use std::collections::BTreeMap;

pub(crate) fn connect(uri: &DatabaseUri) -> Result<Connection, Error> {
    let conn = Conn::new(Opts::from_url(&uri.driver_url())?)?;
    Ok(Connection::Mysql(conn))
}

/// A connection to the server with no default database selected.
fn server_connection(uri: &DatabaseUri) -> Result<Conn, Error> {
    Ok(Conn::new(Opts::from_url(&uri.server_url("")?)?)?)
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub(crate) fn database_exists(uri: &DatabaseUri) -> Result<bool, Error> {
    let name = uri.require_database()?;
    let mut conn = server_connection(uri)?;
    let found: Option<String> = conn.exec_first(
        "SELECT SCHEMA_NAME FROM INFORMATION_SCHEMA.SCHEMATA WHERE SCHEMA_NAME = ?",
        (name,),
    )?;
    Ok(found.is_some())
}

pub(crate) fn create_database(uri: &DatabaseUri) -> Result<(), Error> {
    let name = uri.require_database()?;
    let mut conn = server_connection(uri)?;
    conn.query_drop(format!(
        "CREATE DATABASE {} CHARACTER SET utf8mb4",
        quote_identifier(name)
    ))?;
    Ok(())
}

pub(crate) fn drop_database(uri: &DatabaseUri) -> Result<(), Error> {
    let name = uri.require_database()?;
    let mut conn = server_connection(uri)?;
    conn.query_drop(format!("DROP DATABASE {}", quote_identifier(name)))?;
    Ok(())
}

pub(crate) fn execute(conn: &mut Conn, sql: &str) -> Result<(), Error> {
    // Multi-statement queries are on by default; every result set is drained.
    conn.query_drop(sql)?;
    Ok(())
}

pub(crate) fn version_table_exists(conn: &mut Conn, table: &str) -> Result<bool, Error> {
    let count: Option<i64> = conn.exec_first(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = ?",
        (table,),
    )?;
    Ok(count.unwrap_or(0) > 0)
}

pub(crate) fn create_version_table(conn: &mut Conn, table: &str) -> Result<(), Error> {
    conn.query_drop(format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            version_num VARCHAR(32) NOT NULL,
            CONSTRAINT {table}_pkc PRIMARY KEY (version_num)
        )"
    ))?;
    Ok(())
}

pub(crate) fn read_version_table(conn: &mut Conn, table: &str) -> Result<Vec<String>, Error> {
    let versions: Vec<String> = conn.query(format!("SELECT version_num FROM {}", table))?;
    Ok(versions)
}

pub(crate) fn run_step(
    conn: &mut Conn,
    sql: &str,
    table: &str,
    heads: &[String],
) -> Result<(), Error> {
    // An empty query is an error on the server.
    if !sql.trim().is_empty() {
        #[cfg(feature = "tracing")]
        tracing::trace!(sql = %sql, "Executing revision SQL");
        conn.query_drop(sql)?;
    }

    let mut tx = conn.start_transaction(TxOpts::default())?;
    tx.query_drop(format!("DELETE FROM {}", table))?;
    for head in heads {
        tx.exec_drop(
            format!("INSERT INTO {} (version_num) VALUES (?)", table),
            (head.as_str(),),
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub(crate) fn capture_schema(conn: &mut Conn, exclude_table: &str) -> Result<SchemaSnapshot, Error> {
    let mut tables = BTreeMap::new();

    let table_names: Vec<String> = conn.exec(
        "SELECT table_name FROM information_schema.tables
         WHERE table_schema = DATABASE()
         AND table_type = 'BASE TABLE'
         AND table_name != ?
         ORDER BY table_name",
        (exclude_table,),
    )?;

    for table_name in table_names {
        let columns = get_columns(conn, &table_name)?;
        let indexes = get_indexes(conn, &table_name)?;
        tables.insert(table_name, TableSchema { columns, indexes });
    }

    Ok(SchemaSnapshot { tables })
}

fn get_columns(conn: &mut Conn, table_name: &str) -> Result<Vec<ColumnInfo>, Error> {
    let rows: Vec<(String, String, String, Option<String>, String)> = conn.exec(
        "SELECT
            column_name,
            column_type,
            is_nullable,
            column_default,
            column_key
         FROM information_schema.columns
         WHERE table_schema = DATABASE() AND table_name = ?
         ORDER BY ordinal_position",
        (table_name,),
    )?;

    let columns = rows
        .into_iter()
        .map(
            |(name, type_name, is_nullable, default_value, column_key)| ColumnInfo {
                name,
                type_name,
                not_null: is_nullable == "NO",
                default_value,
                primary_key: column_key == "PRI",
            },
        )
        .collect();

    Ok(columns)
}

fn get_indexes(conn: &mut Conn, table_name: &str) -> Result<Vec<IndexInfo>, Error> {
    let rows: Vec<(String, i64, String)> = conn.exec(
        "SELECT
            index_name,
            non_unique,
            column_name
         FROM information_schema.statistics
         WHERE table_schema = DATABASE() AND table_name = ?
         AND index_name != 'PRIMARY'
         ORDER BY index_name, seq_in_index",
        (table_name,),
    )?;

    // Rows come ordered by index, one per column.
    let mut indexes: Vec<IndexInfo> = Vec::new();
    for (name, non_unique, column) in rows {
        match indexes.last_mut() {
            Some(index) if index.name == name => index.columns.push(column),
            _ => indexes.push(IndexInfo {
                name,
                unique: non_unique == 0,
                columns: vec![column],
            }),
        }
    }

    Ok(indexes)
}
