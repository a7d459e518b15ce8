//! Database drivers.
//!
//! A driver owns the physical connection and does the I/O: connecting,
//! executing statements, reading back affected rows and insert ids. SQL
//! rendering lives in the matching `SqlDialect`.
//!
//! Drivers are picked through `DriverKind`, a closed registry validated when
//! a connection group is added, so an unknown driver name fails at
//! configuration time instead of on the first query.

mod postgres;
mod sqlite;

pub use self::postgres::PostgresDriver;
pub use self::sqlite::SqliteDriver;

use std::time::Duration;

use super::config::ConnectionParams;
use super::dialect::{PostgresDialect, SqlDialect, SqliteDialect};
use super::result::MaterializedResult;
use super::DbError;

/// What a statement produced.
#[derive(Debug)]
pub enum QueryOutcome {
    /// A row-returning statement.
    Rows(MaterializedResult),
    /// A write; carries the affected row count.
    Affected(u64),
}

/// Engine I/O primitives.
pub trait Driver: Send {
    fn kind(&self) -> DriverKind;

    /// Open the connection. `persistent` keeps it for reuse by the pool.
    fn connect(&mut self, persistent: bool) -> Result<(), DbError>;

    fn is_connected(&self) -> bool;

    /// Ping the server and reopen the connection if it went away.
    fn reconnect(&mut self) -> Result<(), DbError>;

    fn close(&mut self);

    fn execute(&mut self, sql: &str) -> Result<QueryOutcome, DbError>;

    fn affected_rows(&self) -> u64;

    /// Id generated by the last insert.
    ///
    /// `table`/`column` name the serial column when the engine needs a
    /// sequence lookup.
    fn insert_id(&mut self, table: Option<&str>, column: Option<&str>) -> Result<i64, DbError>;

    /// Server version string.
    fn version(&mut self) -> Result<String, DbError>;

    fn begin(&mut self) -> Result<(), DbError> {
        self.execute("BEGIN").map(|_| ())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.execute("COMMIT").map(|_| ())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.execute("ROLLBACK").map(|_| ())
    }

    /// Bound every following statement by `timeout`.
    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), DbError>;
}

/// Closed set of supported drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Postgres,
    Sqlite,
}

impl DriverKind {
    /// Resolve a configured driver name.
    pub fn from_name(name: &str) -> Result<Self, DbError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "postgre" | "postgres" | "postgresql" | "pgsql" => Ok(DriverKind::Postgres),
            "sqlite" | "sqlite3" => Ok(DriverKind::Sqlite),
            _ => Err(DbError::UnknownDriver(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DriverKind::Postgres => "postgre",
            DriverKind::Sqlite => "sqlite",
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        match self {
            DriverKind::Postgres => SqlDialect::Postgres(PostgresDialect),
            DriverKind::Sqlite => SqlDialect::Sqlite(SqliteDialect),
        }
    }

    /// Build an unconnected driver for `params`.
    pub fn create(&self, params: &ConnectionParams) -> Box<dyn Driver> {
        match self {
            DriverKind::Postgres => Box::new(PostgresDriver::new(params.clone())),
            DriverKind::Sqlite => Box::new(SqliteDriver::new(params.clone())),
        }
    }
}
