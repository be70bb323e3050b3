//! Migration environment and version-table bookkeeping.
//!
//! An [EnvironmentContext] pairs a validated [Config] with its
//! [ScriptDirectory]. Configuring it against an open [Connection] yields a
//! [MigrationContext], which reads and writes the version table on that
//! connection.

use crate::config::Config;
use crate::engine::Connection;
use crate::script::ScriptDirectory;
use crate::Error;

/// Version-table access over a borrowed connection.
#[derive(Debug)]
pub struct MigrationContext<'conn> {
    connection: &'conn mut Connection,
    version_table: String,
}

impl<'conn> MigrationContext<'conn> {
    pub fn configure(connection: &'conn mut Connection, version_table: impl Into<String>) -> Self {
        Self {
            connection,
            version_table: version_table.into(),
        }
    }

    pub fn version_table(&self) -> &str {
        &self.version_table
    }

    pub fn connection(&mut self) -> &mut Connection {
        self.connection
    }

    pub fn version_table_exists(&mut self) -> Result<bool, Error> {
        self.connection.version_table_exists(&self.version_table)
    }

    /// Every revision recorded in the version table. Empty when nothing has
    /// been applied yet, including when the table does not exist.
    pub fn get_current_heads(&mut self) -> Result<Vec<String>, Error> {
        if !self.version_table_exists()? {
            return Ok(Vec::new());
        }
        self.connection.read_version_table(&self.version_table)
    }

    /// The single current revision, `None` when nothing has been applied.
    ///
    /// Assumes a linear history: with several heads recorded this fails and
    /// [get_current_heads](Self::get_current_heads) has to be used instead.
    pub fn get_current_revision(&mut self) -> Result<Option<String>, Error> {
        let mut heads = self.get_current_heads()?;
        match heads.len() {
            0 => Ok(None),
            1 => Ok(heads.pop()),
            _ => Err(Error::Command(format!(
                "Version table '{}' has more than one head present; please use get_current_heads()",
                self.version_table
            ))),
        }
    }

    /// Create the version table unless it exists. Returns whether it was created.
    pub fn ensure_version_table(&mut self) -> Result<bool, Error> {
        if self.version_table_exists()? {
            return Ok(false);
        }
        self.connection.create_version_table(&self.version_table)?;
        #[cfg(feature = "tracing")]
        tracing::info!(table = %self.version_table, "Created version table");
        Ok(true)
    }

    /// Run one revision's SQL and record `heads` as the current heads.
    pub fn run_step(&mut self, sql: &str, heads: &[String]) -> Result<(), Error> {
        self.connection.run_step(sql, &self.version_table, heads)
    }

    /// Record `heads` without running any SQL.
    pub fn stamp(&mut self, heads: &[String]) -> Result<(), Error> {
        self.run_step("", heads)
    }
}

/// A validated configuration together with the scripts it points at.
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentContext<'a> {
    config: &'a Config,
    script: &'a ScriptDirectory,
}

impl<'a> EnvironmentContext<'a> {
    /// Fails with a configuration error unless both the script location and
    /// the database URL are set.
    pub fn new(config: &'a Config, script: &'a ScriptDirectory) -> Result<Self, Error> {
        config.script_location()?;
        config.url()?;
        Ok(Self { config, script })
    }

    pub fn configure<'conn>(
        &self,
        connection: &'conn mut Connection,
        version_table: &str,
    ) -> MigrationContext<'conn> {
        MigrationContext::configure(connection, version_table)
    }

    /// The head of the script directory, independent of any database.
    pub fn get_head_revision(&self) -> Result<Option<String>, Error> {
        self.script.get_current_head()
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn script(&self) -> &'a ScriptDirectory {
        self.script
    }
}
