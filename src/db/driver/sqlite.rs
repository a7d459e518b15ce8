//! SQLite driver built on `rusqlite`.

use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::Connection as SqliteConnection;
use tracing::debug;

use super::{Driver, DriverKind, QueryOutcome};
use crate::db::config::ConnectionParams;
use crate::db::is_write_type;
use crate::db::result::{FieldMeta, MaterializedResult};
use crate::db::value::Value;
use crate::db::DbError;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteDriver {
    params: ConnectionParams,
    conn: Option<SqliteConnection>,
    persistent: bool,
    affected: u64,
    timeout: Duration,
}

impl SqliteDriver {
    pub fn new(params: ConnectionParams) -> Self {
        let timeout = params.query_timeout().unwrap_or(DEFAULT_BUSY_TIMEOUT);
        Self {
            params,
            conn: None,
            persistent: false,
            affected: 0,
            timeout,
        }
    }

    fn conn(&self) -> Result<&SqliteConnection, DbError> {
        self.conn.as_ref().ok_or_else(|| DbError::OpenFailed {
            target: self.params.database.clone(),
            message: "not connected".to_string(),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(text) => Value::Text(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Bool(_) | Value::Int(_) => "INTEGER",
        Value::Float(_) => "REAL",
        Value::Text(_) => "TEXT",
        Value::Bytes(_) => "BLOB",
    }
}

impl Driver for SqliteDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    fn connect(&mut self, persistent: bool) -> Result<(), DbError> {
        let open_failed = |e: rusqlite::Error| DbError::OpenFailed {
            target: self.params.database.clone(),
            message: e.to_string(),
        };
        let conn = match self.params.database.as_str() {
            "" | ":memory:" => SqliteConnection::open_in_memory(),
            path => SqliteConnection::open(path),
        }
        .map_err(open_failed)?;
        conn.busy_timeout(self.timeout).map_err(open_failed)?;

        debug!(database = %self.params.database, persistent, "sqlite connection opened");
        self.conn = Some(conn);
        self.persistent = persistent;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn reconnect(&mut self) -> Result<(), DbError> {
        // An in-memory database cannot be reopened without losing it, so
        // only a closed handle is reopened.
        if self.conn.is_some() {
            return Ok(());
        }
        self.connect(self.persistent)
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                tracing::warn!(error = %e, "error closing sqlite connection");
            }
        }
    }

    fn execute(&mut self, sql: &str) -> Result<QueryOutcome, DbError> {
        let conn = self.conn()?;

        if is_write_type(sql) {
            let affected = conn.execute(sql, []).map_err(|e| DbError::query(sql, e))? as u64;
            self.affected = affected;
            return Ok(QueryOutcome::Affected(affected));
        }

        let mut stmt = conn.prepare(sql).map_err(|e| DbError::query(sql, e))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([]).map_err(|e| DbError::query(sql, e))?;
        while let Some(row) = cursor.next().map_err(|e| DbError::query(sql, e))? {
            let values = (0..width)
                .map(|idx| row.get_ref(idx).map(value_from_ref))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DbError::Decode(e.to_string()))?;
            rows.push(values);
        }
        drop(cursor);
        drop(stmt);

        let fields = columns
            .iter()
            .enumerate()
            .map(|(idx, name)| FieldMeta {
                name: name.clone(),
                type_name: rows
                    .first()
                    .and_then(|r: &Vec<Value>| r.get(idx))
                    .map(value_type_name)
                    .unwrap_or("NULL")
                    .to_string(),
            })
            .collect();

        self.affected = rows.len() as u64;
        Ok(QueryOutcome::Rows(MaterializedResult {
            columns,
            rows,
            fields,
        }))
    }

    fn affected_rows(&self) -> u64 {
        self.affected
    }

    fn insert_id(&mut self, _table: Option<&str>, _column: Option<&str>) -> Result<i64, DbError> {
        Ok(self.conn()?.last_insert_rowid())
    }

    fn version(&mut self) -> Result<String, DbError> {
        Ok(rusqlite::version().to_string())
    }

    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), DbError> {
        self.timeout = timeout;
        if let Some(conn) = &self.conn {
            conn.busy_timeout(timeout)
                .map_err(|e| DbError::query("PRAGMA busy_timeout", e))?;
        }
        Ok(())
    }
}

impl Drop for SqliteDriver {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> SqliteDriver {
        let mut driver = SqliteDriver::new(ConnectionParams::sqlite_memory());
        driver.connect(true).unwrap();
        driver
    }

    #[test]
    fn test_write_then_read() {
        let mut driver = memory();
        driver
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, data BLOB)")
            .unwrap();
        let outcome = driver
            .execute("INSERT INTO t (name, data) VALUES ('a', X'0102')")
            .unwrap();
        assert!(matches!(outcome, QueryOutcome::Affected(1)));
        assert_eq!(driver.insert_id(None, None).unwrap(), 1);

        match driver.execute("SELECT id, name, data FROM t").unwrap() {
            QueryOutcome::Rows(result) => {
                assert_eq!(result.columns, vec!["id", "name", "data"]);
                assert_eq!(
                    result.rows,
                    vec![vec![Value::Int(1), Value::Text("a".into()), Value::Bytes(vec![1, 2])]]
                );
                assert_eq!(result.fields[0].type_name, "INTEGER");
            }
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[test]
    fn test_query_error_carries_sql() {
        let mut driver = memory();
        let err = driver.execute("SELECT * FROM missing").unwrap_err();
        match err {
            DbError::QueryFailed { sql, .. } => assert_eq!(sql, "SELECT * FROM missing"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_close_and_reconnect() {
        let mut driver = memory();
        driver.close();
        assert!(!driver.is_connected());
        driver.reconnect().unwrap();
        assert!(driver.is_connected());
    }

    #[test]
    fn test_version_is_reported() {
        assert!(memory().version().unwrap().starts_with('3'));
    }
}
