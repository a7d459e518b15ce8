//! Shared test utilities.
//!
//! `RecordingDriver` stands in for a real engine: it records every
//! statement it is sent and answers reads with canned results, so
//! connection and builder tests can assert on the exact SQL.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::db::driver::{Driver, DriverKind, QueryOutcome};
use crate::db::result::MaterializedResult;
use crate::db::value::Value;
use crate::db::{is_write_type, DbError};

#[derive(Default)]
struct Recorded {
    statements: Vec<String>,
    responses: Vec<(String, MaterializedResult)>,
    failures: Vec<String>,
    fail_reconnect: bool,
    affected: u64,
    closed: bool,
}

/// A driver that records statements instead of running them.
///
/// Clones share their recording, so a test can keep one clone and hand
/// the other to a `Connection`.
#[derive(Clone)]
pub struct RecordingDriver {
    kind: DriverKind,
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingDriver {
    pub fn new(kind: DriverKind) -> Self {
        Self {
            kind,
            recorded: Arc::new(Mutex::new(Recorded::default())),
        }
    }

    pub fn sqlite() -> Self {
        Self::new(DriverKind::Sqlite)
    }

    pub fn postgres() -> Self {
        Self::new(DriverKind::Postgres)
    }

    /// Every statement sent so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.recorded.lock().unwrap().statements.clone()
    }

    /// Answer reads starting with `prefix` with these rows.
    pub fn respond(&self, prefix: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
        let result = MaterializedResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            fields: Vec::new(),
        };
        self.recorded
            .lock()
            .unwrap()
            .responses
            .push((prefix.to_string(), result));
    }

    /// Make every later `reconnect` fail, as with a server that went away.
    pub fn fail_reconnect(&self) {
        self.recorded.lock().unwrap().fail_reconnect = true;
    }

    /// Fail statements starting with `prefix`.
    pub fn fail_on(&self, prefix: &str) {
        self.recorded.lock().unwrap().failures.push(prefix.to_string());
    }
}

impl Driver for RecordingDriver {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    fn connect(&mut self, _persistent: bool) -> Result<(), DbError> {
        self.recorded.lock().unwrap().closed = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.recorded.lock().unwrap().closed
    }

    fn reconnect(&mut self) -> Result<(), DbError> {
        if self.recorded.lock().unwrap().fail_reconnect {
            return Err(DbError::OpenFailed {
                target: "recording".to_string(),
                message: "server went away".to_string(),
            });
        }
        self.connect(true)
    }

    fn close(&mut self) {
        self.recorded.lock().unwrap().closed = true;
    }

    fn execute(&mut self, sql: &str) -> Result<QueryOutcome, DbError> {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.statements.push(sql.to_string());

        if recorded.failures.iter().any(|p| sql.starts_with(p.as_str())) {
            return Err(DbError::query(sql, "forced failure"));
        }
        if is_write_type(sql) {
            recorded.affected = 1;
            return Ok(QueryOutcome::Affected(1));
        }
        let result = recorded
            .responses
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default();
        recorded.affected = result.rows.len() as u64;
        Ok(QueryOutcome::Rows(result))
    }

    fn affected_rows(&self) -> u64 {
        self.recorded.lock().unwrap().affected
    }

    fn insert_id(&mut self, _table: Option<&str>, _column: Option<&str>) -> Result<i64, DbError> {
        Ok(0)
    }

    fn version(&mut self) -> Result<String, DbError> {
        Ok("recording".to_string())
    }

    fn set_query_timeout(&mut self, _timeout: Duration) -> Result<(), DbError> {
        Ok(())
    }
}
