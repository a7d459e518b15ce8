//! Schema management and database utilities.
//!
//! - `definition`: `FieldType` and `FieldSpec`, the engine-neutral column
//!   description accumulated by the forge
//! - `forge`: DDL (`CREATE TABLE`, `ALTER TABLE`, databases)
//! - `utility`: database listing, table maintenance, CSV/XML export and
//!   SQL backups
//!
//! Both `Forge` and `Utility` borrow a connection for their lifetime; get
//! them through `Queryable::forge()` / `Queryable::utility()`.

mod definition;
mod forge;
mod utility;

pub use definition::{FieldSpec, FieldType};
pub use forge::Forge;
pub use utility::{BackupOptions, Utility, XmlOptions};

use thiserror::Error;

/// Schema error types
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("A table name is required for that operation")]
    MissingTableName,

    #[error("Field information is required")]
    MissingFieldInfo,

    #[error("A column name is required for that operation")]
    MissingColumnName,

    #[error("A database name is required for that operation")]
    MissingDatabaseName,

    #[error("{operation} is not supported by the {platform} driver")]
    Unsupported {
        platform: &'static str,
        operation: &'static str,
    },
}

impl SchemaError {
    /// Stable key for localized error messages.
    pub fn message_key(&self) -> &'static str {
        match self {
            SchemaError::MissingTableName => "db_table_name_required",
            SchemaError::MissingFieldInfo => "db_field_param_missing",
            SchemaError::MissingColumnName => "db_column_name_required",
            SchemaError::MissingDatabaseName => "db_database_name_required",
            SchemaError::Unsupported { .. } => "db_unsupported_feature",
        }
    }
}
