//! PostgreSQL driver built on the synchronous `postgres` client.

use std::time::Duration;

use ::postgres::types::{FromSql, Type};
use ::postgres::{Client, Config, NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

use super::{Driver, DriverKind, QueryOutcome};
use crate::db::config::ConnectionParams;
use crate::db::escape::escape_string;
use crate::db::is_write_type;
use crate::db::result::{FieldMeta, MaterializedResult};
use crate::db::value::Value;
use crate::db::DbError;

const DEFAULT_PORT: u16 = 5432;

pub struct PostgresDriver {
    params: ConnectionParams,
    client: Option<Client>,
    persistent: bool,
    affected: u64,
    timeout: Option<Duration>,
    server_version: Option<(u32, u32)>,
}

impl PostgresDriver {
    pub fn new(params: ConnectionParams) -> Self {
        let timeout = params.query_timeout();
        Self {
            params,
            client: None,
            persistent: false,
            affected: 0,
            timeout,
            server_version: None,
        }
    }

    fn target(&self) -> String {
        format!(
            "{}:{}/{}",
            self.params.hostname,
            self.params.port.unwrap_or(DEFAULT_PORT),
            self.params.database
        )
    }

    fn config(&self) -> Config {
        let mut config = Config::new();
        config
            .host(if self.params.hostname.is_empty() {
                "localhost"
            } else {
                &self.params.hostname
            })
            .port(self.params.port.unwrap_or(DEFAULT_PORT))
            .user(&self.params.username)
            .dbname(&self.params.database)
            .application_name("mvc_core");
        if !self.params.password.is_empty() {
            config.password(&self.params.password);
        }

        let mut options = vec![format!(
            "-c client_encoding={}",
            self.params.char_set.to_uppercase()
        )];
        if let Some(timeout) = self.timeout {
            options.push(format!("-c statement_timeout={}", timeout.as_millis()));
        }
        config.options(&options.join(" "));
        config
    }

    fn client(&mut self) -> Result<&mut Client, DbError> {
        let target = self.target();
        self.client.as_mut().ok_or_else(|| DbError::OpenFailed {
            target,
            message: "not connected".to_string(),
        })
    }

    /// `(major, minor)` of the server, queried once.
    fn server_version(&mut self) -> Result<(u32, u32), DbError> {
        if let Some(v) = self.server_version {
            return Ok(v);
        }
        let version = self.version()?;
        let parsed = parse_version(&version);
        self.server_version = Some(parsed);
        Ok(parsed)
    }

    fn scalar_i64(&mut self, sql: &str) -> Result<i64, DbError> {
        let row = self
            .client()?
            .query_one(sql, &[])
            .map_err(|e| DbError::query(sql, e))?;
        row.try_get::<_, Option<i64>>(0)
            .map(|v| v.unwrap_or(0))
            .map_err(|e| DbError::Decode(e.to_string()))
    }
}

/// `"16.2 (Debian 16.2-1)"` -> `(16, 2)`.
fn parse_version(version: &str) -> (u32, u32) {
    let numeric = version.split_whitespace().next().unwrap_or_default();
    let mut parts = numeric.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

/// Types `convert_row` reads from the binary protocol.
fn decodes_natively(ty: &Type) -> bool {
    [
        Type::BOOL,
        Type::INT2,
        Type::INT4,
        Type::INT8,
        Type::OID,
        Type::FLOAT4,
        Type::FLOAT8,
        Type::BYTEA,
    ]
    .contains(ty)
        || <String as FromSql<'_>>::accepts(ty)
}

/// A text-protocol cell. NUMERIC, dates and other types without a native
/// decoding keep the server's text rendering.
fn convert_text(text: Option<&str>, ty: &Type) -> Result<Value, DbError> {
    let Some(text) = text else {
        return Ok(Value::Null);
    };
    let invalid = |message: String| DbError::Decode(format!("{} value '{}': {}", ty, text, message));
    let value = if *ty == Type::BOOL {
        Value::Bool(text == "t")
    } else if [Type::INT2, Type::INT4, Type::INT8, Type::OID].contains(ty) {
        Value::Int(text.parse().map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?)
    } else if [Type::FLOAT4, Type::FLOAT8].contains(ty) {
        Value::Float(text.parse().map_err(|e: std::num::ParseFloatError| invalid(e.to_string()))?)
    } else if *ty == Type::BYTEA {
        let digits = text.strip_prefix("\\x").unwrap_or(text);
        Value::Bytes(hex::decode(digits).map_err(|e| invalid(e.to_string()))?)
    } else {
        Value::Text(text.to_string())
    };
    Ok(value)
}

fn convert_row(row: &::postgres::Row) -> Result<Vec<Value>, DbError> {
    let decode = |e: ::postgres::Error| DbError::Decode(e.to_string());
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let ty = column.type_();
            let value: Value = if *ty == Type::BOOL {
                row.try_get::<_, Option<bool>>(idx).map_err(decode)?.into()
            } else if *ty == Type::INT2 {
                row.try_get::<_, Option<i16>>(idx)
                    .map_err(decode)?
                    .map(|v| Value::Int(i64::from(v)))
                    .unwrap_or(Value::Null)
            } else if *ty == Type::INT4 {
                row.try_get::<_, Option<i32>>(idx).map_err(decode)?.into()
            } else if *ty == Type::INT8 {
                row.try_get::<_, Option<i64>>(idx).map_err(decode)?.into()
            } else if *ty == Type::OID {
                row.try_get::<_, Option<u32>>(idx).map_err(decode)?.into()
            } else if *ty == Type::FLOAT4 {
                row.try_get::<_, Option<f32>>(idx)
                    .map_err(decode)?
                    .map(|v| Value::Float(f64::from(v)))
                    .unwrap_or(Value::Null)
            } else if *ty == Type::FLOAT8 {
                row.try_get::<_, Option<f64>>(idx).map_err(decode)?.into()
            } else if *ty == Type::BYTEA {
                row.try_get::<_, Option<Vec<u8>>>(idx).map_err(decode)?.into()
            } else {
                row.try_get::<_, Option<String>>(idx).map_err(decode)?.into()
            };
            Ok(value)
        })
        .collect()
}

impl Driver for PostgresDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Postgres
    }

    fn connect(&mut self, persistent: bool) -> Result<(), DbError> {
        let client = self.config().connect(NoTls).map_err(|e| DbError::OpenFailed {
            target: self.target(),
            message: e.to_string(),
        })?;
        self.client = Some(client);
        self.persistent = persistent;
        debug!(target_db = %self.target(), persistent, "postgres connection opened");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    fn reconnect(&mut self) -> Result<(), DbError> {
        let alive = self
            .client
            .as_mut()
            .is_some_and(|c| c.is_valid(Duration::from_secs(5)).is_ok());
        if alive {
            return Ok(());
        }
        warn!(target_db = %self.target(), "postgres connection lost, reconnecting");
        self.client = None;
        self.connect(self.persistent)
    }

    fn close(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close() {
                warn!(error = %e, "error closing postgres connection");
            }
        }
    }

    fn execute(&mut self, sql: &str) -> Result<QueryOutcome, DbError> {
        if is_write_type(sql) {
            let messages = self
                .client()?
                .simple_query(sql)
                .map_err(|e| DbError::query(sql, e))?;
            let affected = messages
                .iter()
                .filter_map(|m| match m {
                    SimpleQueryMessage::CommandComplete(n) => Some(*n),
                    _ => None,
                })
                .sum();
            self.affected = affected;
            return Ok(QueryOutcome::Affected(affected));
        }

        let client = self.client()?;
        let statement = client.prepare(sql).map_err(|e| DbError::query(sql, e))?;

        let fields = statement
            .columns()
            .iter()
            .map(|c| FieldMeta {
                name: c.name().to_string(),
                type_name: c.type_().name().to_string(),
            })
            .collect::<Vec<_>>();
        let columns = fields.iter().map(|f| f.name.clone()).collect();
        let rows = if statement.columns().iter().all(|c| decodes_natively(c.type_())) {
            client
                .query(&statement, &[])
                .map_err(|e| DbError::query(sql, e))?
                .iter()
                .map(convert_row)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            debug!(category = "db", sql, "reading rows as text");
            let types: Vec<Type> = statement.columns().iter().map(|c| c.type_().clone()).collect();
            client
                .simple_query(sql)
                .map_err(|e| DbError::query(sql, e))?
                .iter()
                .filter_map(|message| match message {
                    SimpleQueryMessage::Row(row) => Some(row),
                    _ => None,
                })
                .map(|row| {
                    types
                        .iter()
                        .enumerate()
                        .map(|(idx, ty)| convert_text(row.get(idx), ty))
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()?
        };

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

    fn insert_id(&mut self, table: Option<&str>, column: Option<&str>) -> Result<i64, DbError> {
        let version = self.server_version()?;
        let sql = match (table, column) {
            (None, _) if version >= (8, 1) => "SELECT LASTVAL() AS ins_id".to_string(),
            (Some(table), Some(column)) if version >= (8, 0) => format!(
                "SELECT CURRVAL(pg_get_serial_sequence('{}', '{}')) AS ins_id",
                escape_string(table),
                escape_string(column)
            ),
            // A bare name is taken as the sequence itself.
            (Some(sequence), None) => {
                format!("SELECT last_value AS ins_id FROM {}", sequence)
            }
            // Last-insert OID: not exposed by the client library.
            _ => return Ok(0),
        };
        self.scalar_i64(&sql)
    }

    fn version(&mut self) -> Result<String, DbError> {
        let sql = "SHOW server_version";
        let row = self
            .client()?
            .query_one(sql, &[])
            .map_err(|e| DbError::query(sql, e))?;
        row.try_get::<_, String>(0)
            .map_err(|e| DbError::Decode(e.to_string()))
    }

    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), DbError> {
        self.timeout = Some(timeout);
        if self.client.is_some() {
            let sql = format!("SET statement_timeout = {}", timeout.as_millis());
            self.client()?
                .batch_execute(&sql)
                .map_err(|e| DbError::query(&sql, e))?;
        }
        Ok(())
    }
}

impl Drop for PostgresDriver {
    fn drop(&mut self) {
        self.close();
    }
}
