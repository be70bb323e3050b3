//! PostgreSQL backend.
//!
//! PostgreSQL supports transactional DDL, so each revision runs in its own
//! transaction together with the version table update. `CREATE DATABASE` and
//! `DROP DATABASE` cannot run inside a transaction and are issued from a
//! connection to the `postgres` maintenance database.

use crate::engine::Connection;
use crate::schema::{ColumnInfo, IndexInfo, SchemaSnapshot, TableSchema};
use crate::uri::DatabaseUri;
use crate::Error;
use postgres::{Client, NoTls};
use std::collections::{BTreeMap, HashSet};

const MAINTENANCE_DATABASE: &str = "postgres";

pub(crate) fn connect(uri: &DatabaseUri) -> Result<Connection, Error> {
    let client = Client::connect(&uri.driver_url(), NoTls)?;
    Ok(Connection::Postgres(client))
}

fn server_connection(uri: &DatabaseUri) -> Result<Client, Error> {
    Ok(Client::connect(&uri.server_url(MAINTENANCE_DATABASE)?, NoTls)?)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn database_exists(uri: &DatabaseUri) -> Result<bool, Error> {
    let name = uri.require_database()?;
    let mut client = server_connection(uri)?;
    let row = client.query_opt("SELECT 1 FROM pg_database WHERE datname = $1", &[&name])?;
    Ok(row.is_some())
}

pub(crate) fn create_database(uri: &DatabaseUri) -> Result<(), Error> {
    let name = uri.require_database()?;
    let mut client = server_connection(uri)?;
    client.batch_execute(&format!("CREATE DATABASE {}", quote_identifier(name)))?;
    Ok(())
}

pub(crate) fn drop_database(uri: &DatabaseUri) -> Result<(), Error> {
    let name = uri.require_database()?;
    let mut client = server_connection(uri)?;
    client.batch_execute(&format!("DROP DATABASE {}", quote_identifier(name)))?;
    Ok(())
}

pub(crate) fn execute(client: &mut Client, sql: &str) -> Result<(), Error> {
    client.batch_execute(sql)?;
    Ok(())
}

pub(crate) fn version_table_exists(client: &mut Client, table: &str) -> Result<bool, Error> {
    let exists: bool = client
        .query_one(
            "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = $1)",
            &[&table],
        )?
        .get(0);
    Ok(exists)
}

pub(crate) fn create_version_table(client: &mut Client, table: &str) -> Result<(), Error> {
    client.batch_execute(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            version_num VARCHAR(32) NOT NULL,
            CONSTRAINT {table}_pkc PRIMARY KEY (version_num)
        )"
    ))?;
    Ok(())
}

pub(crate) fn read_version_table(client: &mut Client, table: &str) -> Result<Vec<String>, Error> {
    let rows = client.query(&format!("SELECT version_num FROM {}", table), &[])?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

pub(crate) fn run_step(
    client: &mut Client,
    sql: &str,
    table: &str,
    heads: &[String],
) -> Result<(), Error> {
    let mut tx = client.transaction()?;
    tx.batch_execute(sql)?;
    tx.execute(&format!("DELETE FROM {}", table), &[])?;
    for head in heads {
        tx.execute(
            &format!("INSERT INTO {} (version_num) VALUES ($1)", table),
            &[head],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub(crate) fn capture_schema(
    client: &mut Client,
    exclude_table: &str,
) -> Result<SchemaSnapshot, Error> {
    let mut tables = BTreeMap::new();

    let table_names: Vec<String> = client
        .query(
            "SELECT table_name::text FROM information_schema.tables
             WHERE table_schema = current_schema()
             AND table_type = 'BASE TABLE'
             AND table_name != $1
             ORDER BY table_name",
            &[&exclude_table],
        )?
        .iter()
        .map(|row| row.get(0))
        .collect();

    for table_name in table_names {
        let columns = get_columns(client, &table_name)?;
        let indexes = get_indexes(client, &table_name)?;
        tables.insert(table_name, TableSchema { columns, indexes });
    }

    Ok(SchemaSnapshot { tables })
}

fn get_columns(client: &mut Client, table_name: &str) -> Result<Vec<ColumnInfo>, Error> {
    let primary_key: HashSet<String> = client
        .query(
            "SELECT kcu.column_name::text
             FROM information_schema.table_constraints tc
             JOIN information_schema.key_column_usage kcu
               ON tc.constraint_name = kcu.constraint_name
              AND tc.table_schema = kcu.table_schema
             WHERE tc.constraint_type = 'PRIMARY KEY'
               AND tc.table_schema = current_schema()
               AND tc.table_name = $1",
            &[&table_name],
        )?
        .iter()
        .map(|row| row.get(0))
        .collect();

    let rows = client.query(
        "SELECT column_name::text, data_type::text, is_nullable::text, column_default::text
         FROM information_schema.columns
         WHERE table_schema = current_schema() AND table_name = $1
         ORDER BY ordinal_position",
        &[&table_name],
    )?;

    let columns = rows
        .iter()
        .map(|row| {
            let name: String = row.get(0);
            let is_nullable: String = row.get(2);
            ColumnInfo {
                primary_key: primary_key.contains(&name),
                name,
                type_name: row.get(1),
                not_null: is_nullable == "NO",
                default_value: row.get(3),
            }
        })
        .collect();

    Ok(columns)
}

fn get_indexes(client: &mut Client, table_name: &str) -> Result<Vec<IndexInfo>, Error> {
    let rows = client.query(
        "SELECT i.relname::text, ix.indisunique, a.attname::text
         FROM pg_class t
         JOIN pg_index ix ON t.oid = ix.indrelid
         JOIN pg_class i ON i.oid = ix.indexrelid
         JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
         WHERE t.relname = $1
           AND pg_table_is_visible(t.oid)
           AND NOT ix.indisprimary
         ORDER BY i.relname, array_position(ix.indkey::int2[], a.attnum)",
        &[&table_name],
    )?;

    let mut indexes: Vec<IndexInfo> = Vec::new();
    for row in &rows {
        let name: String = row.get(0);
        let column: String = row.get(2);
        match indexes.last_mut() {
            Some(index) if index.name == name => index.columns.push(column),
            _ => indexes.push(IndexInfo {
                name,
                unique: row.get(1),
                columns: vec![column],
            }),
        }
    }

    Ok(indexes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_postgres::postgres_server_uri;

    #[test]
    fn create_exists_drop() {
        let uri = DatabaseUri::parse(&format!("{}/pg_backend_cdd", postgres_server_uri())).unwrap();

        assert!(!database_exists(&uri).unwrap());
        create_database(&uri).unwrap();
        assert!(database_exists(&uri).unwrap());
        assert!(create_database(&uri).unwrap_err().is_driver_error());

        drop_database(&uri).unwrap();
        assert!(!database_exists(&uri).unwrap());
        assert!(drop_database(&uri).is_err());
    }

    #[test]
    fn failed_step_is_rolled_back() {
        let uri = DatabaseUri::parse(&format!("{}/pg_backend_rb", postgres_server_uri())).unwrap();
        create_database(&uri).unwrap();

        #[allow(irrefutable_let_patterns)]
        let Connection::Postgres(mut client) = connect(&uri).unwrap() else {
            unreachable!()
        };
        create_version_table(&mut client, "alembic_version").unwrap();
        let result = run_step(
            &mut client,
            "CREATE TABLE t (id SERIAL PRIMARY KEY);\nTHIS IS NOT SQL;",
            "alembic_version",
            &["abc".to_string()],
        );
        assert!(result.is_err());
        assert!(read_version_table(&mut client, "alembic_version")
            .unwrap()
            .is_empty());
        assert!(!version_table_exists(&mut client, "t").unwrap());

        drop(client);
        drop_database(&uri).unwrap();
    }

    #[test]
    fn step_keeps_dollar_quoted_bodies_whole() {
        let uri = DatabaseUri::parse(&format!("{}/pg_backend_fn", postgres_server_uri())).unwrap();
        create_database(&uri).unwrap();

        #[allow(irrefutable_let_patterns)]
        let Connection::Postgres(mut client) = connect(&uri).unwrap() else {
            unreachable!()
        };
        create_version_table(&mut client, "alembic_version").unwrap();
        run_step(
            &mut client,
            "CREATE FUNCTION answer() RETURNS integer AS $$
             BEGIN
                 RETURN 42;
             END;
             $$ LANGUAGE plpgsql;",
            "alembic_version",
            &["abc".to_string()],
        )
        .unwrap();
        let answer: i32 = client.query_one("SELECT answer()", &[]).unwrap().get(0);
        assert_eq!(answer, 42);

        drop(client);
        drop_database(&uri).unwrap();
    }
}
