//! Database connection URIs.
//!
//! URIs follow the `scheme[+driver]://user:password@host[:port]/database` form.
//! Derived URIs are produced by splicing a new database name into the original
//! text, so credentials, host and query string survive byte for byte.

use crate::Error;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// The database engine a URI points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Mysql,
    Postgres,
}

impl Dialect {
    fn from_scheme(scheme: &str) -> Option<Self> {
        // "mysql+mysqlconnector" and friends name a driver we don't care about
        let base = scheme.split('+').next().unwrap_or(scheme);
        match base.to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "mysql" | "mariadb" => Some(Self::Mysql),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// The cargo feature that compiles this backend in.
    pub fn feature(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Sqlite => cfg!(feature = "sqlite"),
            Self::Mysql => cfg!(feature = "mysql"),
            Self::Postgres => cfg!(feature = "postgres"),
        }
    }

    pub(crate) fn not_enabled(&self) -> Error {
        Error::Config(format!(
            "Support for {} databases is not enabled; enable the `{}` feature of alembic-verify",
            self,
            self.feature()
        ))
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.feature())
    }
}

/// A parsed database URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseUri {
    raw: String,
    dialect: Dialect,
    scheme_end: usize,
    // Byte range of the database name within `raw`.
    database: (usize, usize),
}

impl DatabaseUri {
    pub fn parse(uri: &str) -> Result<Self, Error> {
        let scheme_end = uri
            .find("://")
            .ok_or_else(|| Error::Config(format!("Could not parse database URI '{}'", uri)))?;
        let scheme = &uri[..scheme_end];
        let dialect = Dialect::from_scheme(scheme).ok_or_else(|| {
            Error::Config(format!(
                "Unsupported database scheme '{}' in URI '{}'",
                scheme, uri
            ))
        })?;
        let rest_start = scheme_end + 3;

        let database = match dialect {
            Dialect::Sqlite => Self::sqlite_database_span(uri, rest_start)?,
            Dialect::Mysql | Dialect::Postgres => {
                url::Url::parse(uri).map_err(|e| {
                    Error::Config(format!("Could not parse database URI '{}': {}", uri, e))
                })?;
                let end = uri[rest_start..]
                    .find(['?', '#'])
                    .map(|i| rest_start + i)
                    .unwrap_or(uri.len());
                match uri[rest_start..end].find('/') {
                    Some(slash) => (rest_start + slash + 1, end),
                    None => (end, end),
                }
            }
        };

        Ok(Self {
            raw: uri.to_string(),
            dialect,
            scheme_end,
            database,
        })
    }

    // For SQLite the "database name" is the file stem, so `sqlite:////tmp/app.db`
    // derives to `sqlite:////tmp/app_test_xxx.db`.
    fn sqlite_database_span(uri: &str, rest_start: usize) -> Result<(usize, usize), Error> {
        let rest = &uri[rest_start..];
        if rest.is_empty() {
            return Ok((uri.len(), uri.len()));
        }
        if !rest.starts_with('/') {
            return Err(Error::Config(format!(
                "SQLite URIs must not name a host: '{}'",
                uri
            )));
        }
        let path_start = rest_start + 1;
        let path_end = uri[path_start..]
            .find('?')
            .map(|i| path_start + i)
            .unwrap_or(uri.len());
        let path = &uri[path_start..path_end];
        if path == ":memory:" {
            return Ok((path_end, path_end));
        }
        let file_start = path.rfind('/').map(|i| path_start + i + 1).unwrap_or(path_start);
        let file = &uri[file_start..path_end];
        let stem_end = match file.rfind('.') {
            Some(0) | None => path_end,
            Some(dot) => file_start + dot,
        };
        Ok((file_start, stem_end))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The database name segment; empty when the URI names only a server.
    pub fn database(&self) -> &str {
        &self.raw[self.database.0..self.database.1]
    }

    /// Require a non-empty database name, for operations that create or drop one.
    pub fn require_database(&self) -> Result<&str, Error> {
        match self.database() {
            "" => Err(Error::Config(format!(
                "Database URI '{}' does not name a database",
                self.raw
            ))),
            name => Ok(name),
        }
    }

    /// Reject in-memory SQLite URIs (`sqlite://`, `sqlite:///:memory:`).
    ///
    /// Each SQLite connection to such a URI opens its own private database,
    /// so there is nothing to create, drop or migrate.
    pub fn require_persistent(&self) -> Result<(), Error> {
        if self.dialect == Dialect::Sqlite && self.sqlite_path().is_none() {
            return Err(Error::Config(format!(
                "In-memory SQLite database '{}' is not supported, \
                use a file URI such as sqlite:///app.db",
                self.raw
            )));
        }
        Ok(())
    }

    /// Same URI, different database name.
    pub fn with_database(&self, name: &str) -> Result<Self, Error> {
        let (start, end) = self.database;
        if self.dialect == Dialect::Sqlite && start == end {
            // in-memory databases have no name to replace, so derive a file
            return Self::parse(&format!("sqlite:///{}.db", name));
        }
        let mut raw = String::with_capacity(self.raw.len() + name.len());
        raw.push_str(&self.raw[..start]);
        if start == end && !self.raw[..start].ends_with('/') {
            raw.push('/');
        }
        raw.push_str(name);
        raw.push_str(&self.raw[end..]);
        Self::parse(&raw)
    }

    /// The URI with the `+driver` part of the scheme removed, as the Rust drivers expect it.
    #[cfg_attr(not(any(feature = "mysql", feature = "postgres")), allow(dead_code))]
    pub(crate) fn driver_url(&self) -> String {
        let scheme = &self.raw[..self.scheme_end];
        let base = scheme.split('+').next().unwrap_or(scheme);
        format!("{}{}", base, &self.raw[self.scheme_end..])
    }

    /// The driver URL pointed at `database` instead, used to reach the server
    /// when creating or dropping databases.
    #[cfg(any(feature = "mysql", feature = "postgres"))]
    pub(crate) fn server_url(&self, database: &str) -> Result<String, Error> {
        Ok(self.with_database(database)?.driver_url())
    }

    /// Filesystem path of a SQLite database, `None` for in-memory databases.
    pub(crate) fn sqlite_path(&self) -> Option<PathBuf> {
        let rest = &self.raw[self.scheme_end + 3..];
        let path = rest.strip_prefix('/')?;
        let path = path.split('?').next().unwrap_or(path);
        if path.is_empty() || path == ":memory:" {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }
}

impl fmt::Display for DatabaseUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Derive a URI for a throwaway database on the same server as `uri`.
///
/// Only the database name changes: `mysql://root:@localhost/app` becomes
/// `mysql://root:@localhost/app_test_<12 hex chars>`. The suffix comes from a
/// random v4 uuid so tests running in parallel never collide.
pub fn get_temporary_uri(uri: &str) -> Result<String, Error> {
    let parsed = DatabaseUri::parse(uri)?;
    let base = match parsed.database() {
        "" => "alembicverify",
        name => name,
    };
    let suffix = Uuid::new_v4().simple().to_string();
    let name = format!("{}_test_{}", base, &suffix[..12]);
    Ok(parsed.with_database(&name)?.raw)
}
