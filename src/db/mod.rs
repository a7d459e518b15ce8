//! Database abstraction layer.
//!
//! - `registry`: named connection groups, lazily opened and pooled
//! - `connection`: one live connection with transactions and the query cache
//! - `builder`: the active record query builder
//! - `result`: memoizing result cursor
//! - `driver` / `dialect`: engine I/O and engine SQL rendering
//! - `schema`: DDL forge and database utilities
//!
//! # Driver/active-record split
//!
//! A group configured with `active_record: false` hands out connections
//! that only implement `Queryable`. Groups with active record enabled hand
//! out handles that also implement `ActiveRecord`, which is where
//! `builder()` lives. The split is decided by the registry factory, not at
//! runtime by the caller.

pub mod builder;
pub mod cache;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod driver;
pub mod escape;
pub mod registry;
pub mod result;
pub mod schema;
pub mod value;

pub use builder::{JoinType, LikeSide, Operator, OrderDirection, QueryBuilder};
pub use cache::DbCache;
pub use config::ConnectionParams;
pub use connection::{ActiveRecord, Connection, Queryable};
pub use dialect::{DdlCompiler, Dialect, SqlDialect};
pub use driver::{Driver, DriverKind, QueryOutcome};
pub use registry::{ActiveRecordConnection, ConnectionRegistry, PooledConnection};
pub use result::{ResultCursor, ResultKind, ResultRow};
pub use schema::{FieldSpec, FieldType, Forge, SchemaError, Utility};
pub use value::{DatabaseValue, Row, Value};

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::config::ConfigError;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Unable to connect to the database '{target}': {message}")]
    OpenFailed { target: String, message: String },

    #[error("Query failed: {message} [{sql}]")]
    QueryFailed { sql: String, message: String },

    #[error("Invalid DB driver '{0}'")]
    UnknownDriver(String),

    #[error("Active record is disabled for connection group '{0}'")]
    ActiveRecordDisabled(String),

    #[error("You must set the database table to be used with your query")]
    MustSetTable,

    #[error("Deletes are not allowed unless they contain a WHERE or LIKE clause")]
    DeleteWithoutWhere,

    #[error("You must use the set method to update an entry")]
    MustUseSet,

    #[error("You must specify an index to match on for batch updates")]
    MustUseIndex,

    #[error("One or more rows submitted for batch updating is missing the specified index '{0}'")]
    BatchMissingIndex(String),

    #[error("All rows of a batch insert must have the same columns")]
    BatchKeysMismatch,

    #[error("{feature} is not supported by the {platform} driver")]
    Unsupported {
        platform: &'static str,
        feature: &'static str,
    },

    #[error("Timed out waiting for a connection from group '{0}'")]
    PoolTimeout(String),

    #[error("Failed to decode result: {0}")]
    Decode(String),

    #[error("Transaction rolled back after a failed query in group '{0}'")]
    TransactionFailed(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl DbError {
    /// Stable key for localized error messages.
    pub fn message_key(&self) -> &'static str {
        match self {
            DbError::OpenFailed { .. } => "db_unable_to_connect",
            DbError::QueryFailed { .. } => "db_query_failed",
            DbError::UnknownDriver(_) => "db_invalid_driver",
            DbError::ActiveRecordDisabled(_) => "db_active_record_disabled",
            DbError::MustSetTable => "db_must_set_table",
            DbError::DeleteWithoutWhere => "db_del_must_use_where",
            DbError::MustUseSet => "db_must_use_set",
            DbError::MustUseIndex => "db_must_use_index",
            DbError::BatchMissingIndex(_) => "db_batch_missing_index",
            DbError::BatchKeysMismatch => "db_batch_keys_mismatch",
            DbError::Unsupported { .. } => "db_unsupported_feature",
            DbError::PoolTimeout(_) => "db_pool_timeout",
            DbError::Decode(_) => "db_decode_failed",
            DbError::TransactionFailed(_) => "db_transaction_failed",
            DbError::Config(e) => e.message_key(),
            DbError::Schema(e) => e.message_key(),
        }
    }

    pub(crate) fn query(sql: &str, message: impl ToString) -> Self {
        DbError::QueryFailed {
            sql: sql.to_string(),
            message: message.to_string(),
        }
    }
}

/// Whether `sql` modifies data or schema rather than returning rows.
pub fn is_write_type(sql: &str) -> bool {
    static WRITE: OnceLock<Option<Regex>> = OnceLock::new();
    WRITE
        .get_or_init(|| {
            Regex::new(
                r"(?i)^\s*(SET|INSERT|UPDATE|DELETE|REPLACE|CREATE|DROP|TRUNCATE|LOAD\s+DATA|COPY|ALTER|GRANT|REVOKE|LOCK|UNLOCK|VACUUM|BEGIN|COMMIT|ROLLBACK)\b",
            )
            .ok()
        })
        .as_ref()
        .is_some_and(|re| re.is_match(sql))
}
