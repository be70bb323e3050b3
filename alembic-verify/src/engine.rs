//! Engines and connections.
//!
//! An [Engine] is a parsed URI whose backend is compiled in. It holds no
//! connection of its own: every [Engine::connect] opens a fresh blocking
//! connection that is closed when the returned [Connection] is dropped.

use crate::schema::SchemaSnapshot;
use crate::uri::{DatabaseUri, Dialect};
use crate::Error;
use std::fmt;

/// An open connection to one of the supported databases.
pub enum Connection {
    #[cfg(feature = "sqlite")]
    Sqlite(rusqlite::Connection),
    #[cfg(feature = "mysql")]
    Mysql(mysql::Conn),
    #[cfg(feature = "postgres")]
    Postgres(postgres::Client),
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("dialect", &self.dialect())
            .finish()
    }
}

impl Connection {
    /// Open a connection to the database named by `uri`.
    pub fn open(uri: &DatabaseUri) -> Result<Self, Error> {
        with_dialect!(uri, backend => backend::connect(uri))
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => Dialect::Sqlite,
            #[cfg(feature = "mysql")]
            Self::Mysql(_) => Dialect::Mysql,
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => Dialect::Postgres,
        }
    }

    /// Execute a batch of SQL statements in one round trip.
    pub fn execute(&mut self, sql: &str) -> Result<(), Error> {
        if sql.trim().is_empty() {
            return Ok(());
        }
        with_connection!(self, conn, backend => backend::execute(conn, sql))
    }

    pub(crate) fn version_table_exists(&mut self, table: &str) -> Result<bool, Error> {
        with_connection!(self, conn, backend => backend::version_table_exists(conn, table))
    }

    pub(crate) fn create_version_table(&mut self, table: &str) -> Result<(), Error> {
        with_connection!(self, conn, backend => backend::create_version_table(conn, table))
    }

    pub(crate) fn read_version_table(&mut self, table: &str) -> Result<Vec<String>, Error> {
        with_connection!(self, conn, backend => backend::read_version_table(conn, table))
    }

    /// Run one revision's SQL and record `heads` as the new content of the
    /// version table. Empty `sql` only rewrites the version table.
    pub(crate) fn run_step(&mut self, sql: &str, table: &str, heads: &[String]) -> Result<(), Error> {
        with_connection!(self, conn, backend => backend::run_step(conn, sql, table, heads))
    }

    pub(crate) fn capture_schema(&mut self, exclude_table: &str) -> Result<SchemaSnapshot, Error> {
        with_connection!(self, conn, backend => backend::capture_schema(conn, exclude_table))
    }
}

/// Entry point to a database: knows where it is, connects on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engine {
    uri: DatabaseUri,
}

/// Create an [Engine] for `uri` without connecting.
///
/// Fails with a configuration error when the URI is malformed, names a
/// database whose backend feature is not enabled, or names an in-memory
/// SQLite database. Every connection to `sqlite://` would see its own empty
/// database, so nothing a migration does could be observed afterwards.
pub fn create_engine(uri: &str) -> Result<Engine, Error> {
    let uri = DatabaseUri::parse(uri)?;
    if !uri.dialect().is_enabled() {
        return Err(uri.dialect().not_enabled());
    }
    uri.require_persistent()?;
    Ok(Engine { uri })
}

impl Engine {
    pub fn url(&self) -> &DatabaseUri {
        &self.uri
    }

    pub fn dialect(&self) -> Dialect {
        self.uri.dialect()
    }

    pub fn connect(&self) -> Result<Connection, Error> {
        Connection::open(&self.uri)
    }

    /// Execute SQL on a short-lived connection.
    pub fn execute(&self, sql: &str) -> Result<(), Error> {
        self.connect()?.execute(sql)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::test_scripts::SqliteDb;

    #[test]
    fn connects_and_executes() {
        let db = SqliteDb::new();
        let engine = create_engine(db.uri()).unwrap();
        assert_eq!(engine.dialect(), Dialect::Sqlite);

        engine
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t VALUES (1);")
            .unwrap();

        let mut conn = engine.connect().unwrap();
        assert!(!conn.version_table_exists("alembic_version").unwrap());
        conn.create_version_table("alembic_version").unwrap();
        assert!(conn.version_table_exists("alembic_version").unwrap());
        assert!(conn.read_version_table("alembic_version").unwrap().is_empty());
    }

    #[test]
    fn connecting_to_a_missing_database_is_a_driver_error() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("sqlite:///{}", dir.path().join("missing.db").display());
        let err = create_engine(&uri).unwrap().connect().unwrap_err();
        assert!(err.is_driver_error());
    }

    #[cfg(not(feature = "mysql"))]
    #[test]
    fn disabled_backend_is_a_config_error() {
        assert!(matches!(
            create_engine("mysql://root:@localhost/app"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn in_memory_database_is_a_config_error() {
        for uri in ["sqlite://", "sqlite:///:memory:"] {
            assert!(
                matches!(create_engine(uri), Err(Error::Config(_))),
                "{uri} should be rejected"
            );
        }
    }

    #[test]
    fn semicolons_inside_compound_statements_survive() {
        let db = SqliteDb::new();
        let engine = create_engine(db.uri()).unwrap();
        engine
            .execute(
                "CREATE TABLE t (id INTEGER PRIMARY KEY, note TEXT);
                 CREATE TRIGGER t_note AFTER INSERT ON t BEGIN
                     UPDATE t SET note = 'a; b' WHERE id = NEW.id;
                 END;
                 INSERT INTO t (id) VALUES (1);",
            )
            .unwrap();

        #[allow(irrefutable_let_patterns)]
        let Connection::Sqlite(conn) = engine.connect().unwrap() else {
            unreachable!()
        };
        let note: String = conn
            .query_row("SELECT note FROM t WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(note, "a; b");
    }

    #[test]
    fn malformed_uri_is_a_config_error() {
        assert!(matches!(create_engine("nonsense"), Err(Error::Config(_))));
    }
}
