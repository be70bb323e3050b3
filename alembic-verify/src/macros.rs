//! Dispatch to the backend modules.
//!
//! Each backend (`sqlite`, `mysql`, `postgres`) exposes the same set of
//! free functions; these macros bind the module matching a connection or a
//! URI dialect to a local name so call sites stay backend-agnostic.

/// Match a [Connection](crate::engine::Connection), binding the driver handle
/// to `$inner` and the backend module to `$backend`.
macro_rules! with_connection {
    ($conn:expr, $inner:ident, $backend:ident => $body:expr) => {
        match $conn {
            #[cfg(feature = "sqlite")]
            $crate::engine::Connection::Sqlite($inner) => {
                use $crate::sqlite as $backend;
                $body
            }
            #[cfg(feature = "mysql")]
            $crate::engine::Connection::Mysql($inner) => {
                use $crate::mysql as $backend;
                $body
            }
            #[cfg(feature = "postgres")]
            $crate::engine::Connection::Postgres($inner) => {
                use $crate::postgres as $backend;
                $body
            }
        }
    };
}

/// Match the dialect of a [DatabaseUri](crate::uri::DatabaseUri), binding the
/// backend module to `$backend`. Dialects whose feature is off yield a
/// configuration error.
macro_rules! with_dialect {
    ($uri:expr, $backend:ident => $body:expr) => {
        match $uri.dialect() {
            #[cfg(feature = "sqlite")]
            $crate::uri::Dialect::Sqlite => {
                use $crate::sqlite as $backend;
                $body
            }
            #[cfg(feature = "mysql")]
            $crate::uri::Dialect::Mysql => {
                use $crate::mysql as $backend;
                $body
            }
            #[cfg(feature = "postgres")]
            $crate::uri::Dialect::Postgres => {
                use $crate::postgres as $backend;
                $body
            }
            #[allow(unreachable_patterns)]
            other => Err(other.not_enabled()),
        }
    };
}
