//! DDL builder.
//!
//! Fields and keys accumulate on the forge until a table operation uses
//! them. `create_table`, `add_column` and `modify_column` take the pending
//! fields whether they succeed or not, so one call never sees fields
//! added for another.

use tracing::debug;

use super::definition::{FieldSpec, FieldType};
use super::SchemaError;
use crate::db::connection::Connection;
use crate::db::dialect::DdlCompiler;
use crate::db::DbError;

#[derive(Debug, Clone)]
enum PendingField {
    Spec(FieldSpec),
    Raw(String),
}

pub struct Forge<'c> {
    conn: &'c mut Connection,
    fields: Vec<PendingField>,
    primary_keys: Vec<String>,
    keys: Vec<String>,
}

fn require(name: &str, err: SchemaError) -> Result<&str, SchemaError> {
    let name = name.trim();
    if name.is_empty() {
        Err(err)
    } else {
        Ok(name)
    }
}

impl<'c> Forge<'c> {
    pub fn new(conn: &'c mut Connection) -> Self {
        Self {
            conn,
            fields: Vec::new(),
            primary_keys: Vec::new(),
            keys: Vec::new(),
        }
    }

    pub fn add_field(&mut self, field: FieldSpec) -> &mut Self {
        self.fields.push(PendingField::Spec(field));
        self
    }

    /// A column definition used as written.
    ///
    /// The shorthand `"id"` adds an auto-increment integer primary key.
    pub fn add_raw_field(&mut self, definition: &str) -> &mut Self {
        if definition.trim() == "id" {
            self.primary_keys.push("id".to_string());
            return self.add_field(
                FieldSpec::new("id", FieldType::Int)
                    .constraint("9")
                    .auto_increment(),
            );
        }
        self.fields.push(PendingField::Raw(definition.to_string()));
        self
    }

    /// Mark `field` as (part of) the primary key, or give it an index.
    pub fn add_key(&mut self, field: &str, primary: bool) -> &mut Self {
        let field = field.trim().to_string();
        if primary {
            self.primary_keys.push(field);
        } else {
            self.keys.push(field);
        }
        self
    }

    pub fn pending_fields(&self) -> usize {
        self.fields.len()
    }

    fn take_fields(&mut self) -> (Vec<FieldSpec>, Vec<String>) {
        let mut specs = Vec::new();
        let mut raw = Vec::new();
        for field in std::mem::take(&mut self.fields) {
            match field {
                PendingField::Spec(spec) => specs.push(spec),
                PendingField::Raw(sql) => raw.push(sql),
            }
        }
        (specs, raw)
    }

    fn reset(&mut self) {
        self.fields.clear();
        self.primary_keys.clear();
        self.keys.clear();
    }

    fn run_all(&mut self, statements: &[String]) -> Result<(), DbError> {
        for sql in statements {
            self.conn.execute(sql)?;
        }
        Ok(())
    }

    fn unsupported(&self, operation: &'static str) -> DbError {
        SchemaError::Unsupported {
            platform: self.conn.platform(),
            operation,
        }
        .into()
    }

    /// CREATE TABLE from the pending fields and keys, then its indexes.
    pub fn create_table(&mut self, table: &str, if_not_exists: bool) -> Result<(), DbError> {
        let (specs, raw) = self.take_fields();
        let primary_keys = std::mem::take(&mut self.primary_keys);
        let keys = std::mem::take(&mut self.keys);

        let table = require(table, SchemaError::MissingTableName)?;
        if specs.is_empty() && raw.is_empty() {
            return Err(SchemaError::MissingFieldInfo.into());
        }

        let dialect = self.conn.dialect();
        let table = self.conn.protect_table(table);
        let mut statements = vec![dialect.create_table_sql(
            &table,
            &specs,
            &raw,
            &primary_keys,
            if_not_exists,
        )];
        statements.extend(keys.iter().map(|k| dialect.create_index_sql(&table, k)));

        debug!(category = "db_forge", table = %table, "creating table");
        self.run_all(&statements)
    }

    pub fn drop_table(&mut self, table: &str) -> Result<(), DbError> {
        let table = require(table, SchemaError::MissingTableName)?;
        let sql = self
            .conn
            .dialect()
            .drop_table_sql(&self.conn.protect_table(table), true);
        self.conn.execute(&sql).map(|_| ())
    }

    pub fn rename_table(&mut self, from: &str, to: &str) -> Result<(), DbError> {
        let from = require(from, SchemaError::MissingTableName)?;
        let to = require(to, SchemaError::MissingTableName)?;
        let sql = self
            .conn
            .dialect()
            .rename_table_sql(&self.conn.protect_table(from), &self.conn.protect_table(to));
        self.conn.execute(&sql).map(|_| ())
    }

    /// ALTER TABLE ADD COLUMN for each pending field.
    ///
    /// Column placement (`after`) is not supported by postgres or sqlite;
    /// new columns always go last.
    pub fn add_column(&mut self, table: &str, after: Option<&str>) -> Result<(), DbError> {
        let (specs, raw) = self.take_fields();
        self.reset();

        let table = require(table, SchemaError::MissingTableName)?;
        if specs.is_empty() && raw.is_empty() {
            return Err(SchemaError::MissingFieldInfo.into());
        }
        if let Some(after) = after {
            debug!(category = "db_forge", after, "column placement ignored");
        }

        let dialect = self.conn.dialect();
        let table = self.conn.protect_table(table);
        let mut statements: Vec<String> = specs
            .iter()
            .map(|f| dialect.add_column_sql(&table, f))
            .collect();
        statements.extend(
            raw.iter()
                .map(|def| format!("ALTER TABLE {} ADD COLUMN {}", table, def)),
        );
        self.run_all(&statements)
    }

    pub fn drop_column(&mut self, table: &str, column: &str) -> Result<(), DbError> {
        let table = require(table, SchemaError::MissingTableName)?;
        let column = require(column, SchemaError::MissingColumnName)?;
        let sql = self
            .conn
            .dialect()
            .drop_column_sql(&self.conn.protect_table(table), column);
        self.conn.execute(&sql).map(|_| ())
    }

    /// Change type, nullability, default or name of each pending field.
    pub fn modify_column(&mut self, table: &str) -> Result<(), DbError> {
        let (specs, raw) = self.take_fields();
        self.reset();

        let table = require(table, SchemaError::MissingTableName)?;
        if specs.is_empty() {
            return Err(SchemaError::MissingFieldInfo.into());
        }
        if !raw.is_empty() {
            return Err(self.unsupported("modify_column with raw definitions"));
        }

        let dialect = self.conn.dialect();
        let table = self.conn.protect_table(table);
        let mut statements = Vec::new();
        for field in &specs {
            let sql = dialect
                .modify_column_sql(&table, field)
                .ok_or_else(|| self.unsupported("modify_column"))?;
            statements.extend(sql);
        }
        self.run_all(&statements)
    }

    pub fn create_database(&mut self, name: &str) -> Result<(), DbError> {
        let name = require(name, SchemaError::MissingDatabaseName)?;
        let sql = self
            .conn
            .dialect()
            .create_database_sql(name)
            .ok_or_else(|| self.unsupported("create_database"))?;
        self.conn.execute(&sql).map(|_| ())
    }

    pub fn drop_database(&mut self, name: &str) -> Result<(), DbError> {
        let name = require(name, SchemaError::MissingDatabaseName)?;
        let sql = self
            .conn
            .dialect()
            .drop_database_sql(name)
            .ok_or_else(|| self.unsupported("drop_database"))?;
        self.conn.execute(&sql).map(|_| ())
    }
}
