/// Error type for the alembic-verify crate.
///
/// Driver errors are carried unmodified so callers can tell a database-side
/// failure (unreachable server, bad credentials, rejected SQL) apart from a
/// misconfigured script folder or an invalid revision.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[cfg(feature = "sqlite")]
    #[error("{0}")]
    Rusqlite(rusqlite::Error),
    #[cfg(feature = "mysql")]
    #[error("{0}")]
    Mysql(String),
    #[cfg(feature = "postgres")]
    #[error("{0}")]
    Postgres(#[from] postgres::Error),
    /// Missing configuration option, malformed URI, missing script folder
    /// or a backend that was not compiled in.
    #[error("{0}")]
    Config(String),
    /// A revision file in the script directory could not be understood.
    #[error("{0}")]
    Script(String),
    /// The migration tool refused the request: unknown or ambiguous revision,
    /// multiple heads where one was expected, invalid target.
    #[error("{0}")]
    Command(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("Schema mismatch:\n{0}")]
    SchemaMismatch(String),
}

impl Error {
    /// Whether this error came from the database driver. That covers both
    /// connection failures and SQL the database refused to run.
    pub fn is_driver_error(&self) -> bool {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Rusqlite(_) => true,
            #[cfg(feature = "mysql")]
            Self::Mysql(_) => true,
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => true,
            _ => false,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Rusqlite(value)
    }
}

#[cfg(feature = "mysql")]
impl From<mysql::Error> for Error {
    fn from(value: mysql::Error) -> Self {
        Self::Mysql(value.to_string())
    }
}

#[cfg(feature = "mysql")]
impl From<mysql::UrlError> for Error {
    fn from(value: mysql::UrlError) -> Self {
        Self::Config(value.to_string())
    }
}

// Manual PartialEq implementation because postgres::Error and io::Error don't implement PartialEq
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            #[cfg(feature = "sqlite")]
            (Self::Rusqlite(a), Self::Rusqlite(b)) => a == b,
            #[cfg(feature = "mysql")]
            (Self::Mysql(a), Self::Mysql(b)) => a == b,
            #[cfg(feature = "postgres")]
            (Self::Postgres(a), Self::Postgres(b)) => a.to_string() == b.to_string(),
            (Self::Config(a), Self::Config(b)) => a == b,
            (Self::Script(a), Self::Script(b)) => a == b,
            (Self::Command(a), Self::Command(b)) => a == b,
            (Self::Io(a), Self::Io(b)) => a.kind() == b.kind() && a.to_string() == b.to_string(),
            (Self::SchemaMismatch(a), Self::SchemaMismatch(b)) => a == b,
            _ => false,
        }
    }
}
