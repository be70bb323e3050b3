#![cfg_attr(docsrs, feature(doc_cfg))]
//! `alembic-verify` is a toolkit for testing database migrations.
//!
//! It checks that migration scripts and an application's data model stay in
//! sync: it creates throwaway databases, runs the migrations against them,
//! inspects which revisions got applied, and tears the databases down again
//! when the test is over.
//!
//! # Migrations
//!
//! Migrations follow the Alembic layout: a script folder holding one SQL file
//! per revision under `versions/`, and an `alembic_version` table recording
//! the applied heads. See [ScriptDirectory] for the file format and
//! [command] for `upgrade`, `downgrade` and `stamp`.
//!
//! # Example
//!
//! ```rust,no_run
//! use alembic_verify::{
//!     command, create_engine, get_current_revision, get_head_revision, get_temporary_uri,
//!     make_alembic_config, ScriptDirectory, TemporaryDatabase,
//! };
//!
//! # fn main() -> Result<(), alembic_verify::Error> {
//! let uri = get_temporary_uri("sqlite:///target/app.db")?;
//! let db = TemporaryDatabase::create(uri)?;
//! let config = make_alembic_config(db.uri(), "migrations");
//!
//! command::upgrade(&config, "head")?;
//!
//! let engine = create_engine(db.uri())?;
//! let script = ScriptDirectory::from_config(&config)?;
//! assert_eq!(
//!     get_current_revision(&config, &engine, &script)?,
//!     get_head_revision(&config, &engine, &script)?,
//! );
//! # Ok(())
//! # }
//! ```
//!
//! # Database support
//!
//! - SQLite - available with the `sqlite` feature flag (default).
//! - MySQL - available with the `mysql` feature flag.
//! - PostgreSQL - available with the `postgres` feature flag.
//!
//! # Other features
//!
//! - `tracing` - structured events for every revision run and every database
//!   created or dropped.
//! - `fixtures` - [rstest](https://docs.rs/rstest) fixtures in [fixtures].

#[cfg(not(any(feature = "sqlite", feature = "mysql", feature = "postgres")))]
compile_error!("alembic-verify needs at least one of the `sqlite`, `mysql` or `postgres` features");

#[macro_use]
mod macros;

mod config;
pub use config::{make_alembic_config, Config, SCRIPT_LOCATION, SQLALCHEMY_URL};

mod error;
pub use error::Error;

mod uri;
pub use uri::{get_temporary_uri, DatabaseUri, Dialect};

mod engine;
pub use engine::{create_engine, Connection, Engine};

mod script;
pub use script::{Script, ScriptDirectory};

mod migration;
pub use migration::{EnvironmentContext, MigrationContext};

pub mod command;
pub use command::{prepare_schema_from_migrations, MigrationReport, Target};

mod revision;
pub use revision::{
    get_current_revision, get_current_revisions, get_head_revision, resolve_revision, Revision,
    RevisionMode, RevisionType, VERSION_TABLE,
};

mod schema;
pub use schema::{
    assert_schemas_match, capture_schema, ColumnInfo, IndexInfo, SchemaDiff, SchemaSnapshot,
    TableSchema,
};

mod database;
pub use database::{
    create_database, database_exists, drop_database, new_db, safe_destroy_database,
    TemporaryDatabase,
};

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "mysql")]
mod mysql;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "fixtures")]
#[cfg_attr(docsrs, doc(cfg(feature = "fixtures")))]
pub mod fixtures;

#[cfg(test)]
mod test_scripts;

#[cfg(all(test, feature = "mysql"))]
mod test_mysql;

#[cfg(all(test, feature = "postgres"))]
mod test_postgres;
