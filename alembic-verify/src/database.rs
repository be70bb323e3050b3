//! Creating and destroying whole databases.

use crate::uri::DatabaseUri;
use crate::Error;

fn parse(uri: &str) -> Result<DatabaseUri, Error> {
    let uri = DatabaseUri::parse(uri)?;
    uri.require_persistent()?;
    Ok(uri)
}

pub fn database_exists(uri: &str) -> Result<bool, Error> {
    let uri = parse(uri)?;
    with_dialect!(uri, backend => backend::database_exists(&uri))
}

/// Create the database named by `uri`. Fails if it already exists.
pub fn create_database(uri: &str) -> Result<(), Error> {
    let uri = parse(uri)?;
    with_dialect!(uri, backend => backend::create_database(&uri))?;
    #[cfg(feature = "tracing")]
    tracing::info!(database = %uri.database(), dialect = %uri.dialect(), "Created database");
    Ok(())
}

/// Drop the database named by `uri`. Fails if it does not exist.
pub fn drop_database(uri: &str) -> Result<(), Error> {
    let uri = parse(uri)?;
    with_dialect!(uri, backend => backend::drop_database(&uri))?;
    #[cfg(feature = "tracing")]
    tracing::info!(database = %uri.database(), dialect = %uri.dialect(), "Dropped database");
    Ok(())
}

/// Create a fresh, empty database at `uri`, dropping any previous one first.
pub fn new_db(uri: &str) -> Result<(), Error> {
    if database_exists(uri)? {
        drop_database(uri)?;
    }
    create_database(uri)
}

/// Drop the database at `uri` if it exists. Never fails.
///
/// Errors, including the database being missing or the server being
/// unreachable, are logged and swallowed so teardown cannot mask the
/// outcome of the test that ran before it.
pub fn safe_destroy_database(uri: &str) {
    let result = database_exists(uri).and_then(|exists| match exists {
        true => drop_database(uri),
        false => Ok(()),
    });
    if let Err(_e) = result {
        #[cfg(feature = "tracing")]
        tracing::warn!(uri = %uri, error = %_e, "Ignoring error while destroying database");
    }
}

/// A database that lives as long as this guard.
///
/// Created empty by [TemporaryDatabase::create]; destroyed with
/// [safe_destroy_database] when dropped, also while unwinding from a failed
/// assertion.
#[derive(Debug)]
pub struct TemporaryDatabase {
    uri: String,
}

impl TemporaryDatabase {
    pub fn create(uri: impl Into<String>) -> Result<Self, Error> {
        let uri = uri.into();
        new_db(&uri)?;
        Ok(Self { uri })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl Drop for TemporaryDatabase {
    fn drop(&mut self) {
        safe_destroy_database(&self.uri);
    }
}
