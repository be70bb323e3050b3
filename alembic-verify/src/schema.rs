//! Schema snapshots, for checking that a migrated database matches one built
//! straight from the application's model.

use crate::engine::{create_engine, Engine};
use crate::revision::VERSION_TABLE;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Represents a captured database schema for comparison and snapshotting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Map of table name to table definitions
    pub tables: BTreeMap<String, TableSchema>,
}

/// Represents a table's schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in declaration order
    pub columns: Vec<ColumnInfo>,
    /// Secondary indexes, sorted by name
    pub indexes: Vec<IndexInfo>,
}

/// Information about a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

/// Information about an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

/// Differences found between two snapshots, one line per difference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    pub differences: Vec<String>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.differences.is_empty()
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.differences {
            writeln!(f, "  - {}", line)?;
        }
        Ok(())
    }
}

impl SchemaSnapshot {
    /// Compare `self` (expected) against `actual`.
    pub fn diff(&self, actual: &SchemaSnapshot) -> SchemaDiff {
        let mut differences = Vec::new();

        for name in self.tables.keys() {
            if !actual.tables.contains_key(name) {
                differences.push(format!("Table '{}' is missing", name));
            }
        }
        for name in actual.tables.keys() {
            if !self.tables.contains_key(name) {
                differences.push(format!("Unexpected table '{}' found", name));
            }
        }

        for (name, expected) in &self.tables {
            let Some(found) = actual.tables.get(name) else {
                continue;
            };

            for column in &expected.columns {
                match found.columns.iter().find(|c| c.name == column.name) {
                    None => differences.push(format!(
                        "Column '{}.{}' is missing",
                        name, column.name
                    )),
                    Some(other) if other != column => differences.push(format!(
                        "Column '{}.{}' differs: expected {:?}, found {:?}",
                        name, column.name, column, other
                    )),
                    Some(_) => {}
                }
            }
            for column in &found.columns {
                if !expected.columns.iter().any(|c| c.name == column.name) {
                    differences.push(format!(
                        "Unexpected column '{}.{}' found",
                        name, column.name
                    ));
                }
            }

            for index in &expected.indexes {
                match found.indexes.iter().find(|i| i.name == index.name) {
                    None => differences.push(format!(
                        "Index '{}' on table '{}' is missing",
                        index.name, name
                    )),
                    Some(other) if other != index => differences.push(format!(
                        "Index '{}' on table '{}' differs: expected {:?}, found {:?}",
                        index.name, name, index, other
                    )),
                    Some(_) => {}
                }
            }
            for index in &found.indexes {
                if !expected.indexes.iter().any(|i| i.name == index.name) {
                    differences.push(format!(
                        "Unexpected index '{}' on table '{}' found",
                        index.name, name
                    ));
                }
            }
        }

        SchemaDiff { differences }
    }
}

/// Capture the schema of the database behind `engine`, leaving out the version table.
pub fn capture_schema(engine: &Engine) -> Result<SchemaSnapshot, Error> {
    let mut conn = engine.connect()?;
    conn.capture_schema(VERSION_TABLE)
}

/// Fail with [Error::SchemaMismatch] unless the two databases have the same schema.
///
/// `left` is treated as the expected side in the report.
pub fn assert_schemas_match(left_uri: &str, right_uri: &str) -> Result<(), Error> {
    let left = capture_schema(&create_engine(left_uri)?)?;
    let right = capture_schema(&create_engine(right_uri)?)?;
    let diff = left.diff(&right);
    if diff.is_empty() {
        Ok(())
    } else {
        Err(Error::SchemaMismatch(diff.to_string()))
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::command::upgrade;
    use crate::test_scripts::{linear_history, SqliteDb};

    #[test]
    fn captures_migrated_tables() {
        let folder = linear_history();
        let db = SqliteDb::new();
        upgrade(&folder.config(db.uri()), "head").unwrap();

        let snapshot = capture_schema(&create_engine(db.uri()).unwrap()).unwrap();

        assert_eq!(
            snapshot.tables.keys().collect::<Vec<_>>(),
            vec!["account", "employee"]
        );
        let employee = &snapshot.tables["employee"];
        let names: Vec<&str> = employee.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "account_id", "title", "email"]);
        assert!(employee.columns[0].primary_key);
        assert!(employee.columns[1].not_null);
    }

    #[test]
    fn migrations_match_model() {
        let folder = linear_history();
        let migrated = SqliteDb::new();
        upgrade(&folder.config(migrated.uri()), "head").unwrap();

        let model = SqliteDb::new();
        create_engine(model.uri())
            .unwrap()
            .execute(
                "CREATE TABLE account (id INTEGER PRIMARY KEY, name VARCHAR(50) NOT NULL);
                 CREATE TABLE employee (id INTEGER PRIMARY KEY, account_id INTEGER NOT NULL,
                     title VARCHAR(50), email VARCHAR(100));",
            )
            .unwrap();

        assert_schemas_match(migrated.uri(), model.uri()).unwrap();
    }

    #[test]
    fn reports_differences() {
        let folder = linear_history();
        let migrated = SqliteDb::new();
        upgrade(&folder.config(migrated.uri()), "head").unwrap();

        let model = SqliteDb::new();
        create_engine(model.uri())
            .unwrap()
            .execute(
                "CREATE TABLE account (id INTEGER PRIMARY KEY, name VARCHAR(80) NOT NULL);
                 CREATE TABLE employee (id INTEGER PRIMARY KEY, account_id INTEGER NOT NULL,
                     title VARCHAR(50));
                 CREATE INDEX ix_employee_title ON employee (title);
                 CREATE TABLE audit (id INTEGER PRIMARY KEY);",
            )
            .unwrap();

        let Err(Error::SchemaMismatch(report)) = assert_schemas_match(migrated.uri(), model.uri())
        else {
            panic!("expected a schema mismatch");
        };
        assert!(report.contains("Unexpected table 'audit' found"));
        assert!(report.contains("Column 'account.name' differs"));
        assert!(report.contains("Column 'employee.email' is missing"));
        assert!(report.contains("Unexpected index 'ix_employee_title' on table 'employee' found"));
    }
}
