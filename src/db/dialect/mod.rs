//! SQL dialects.
//!
//! A dialect is the pure half of a driver adapter: it renders statements
//! and literals but never touches a connection. Drivers pick their dialect
//! at construction time and the query builder and schema forge only talk to
//! the `Dialect`/`DdlCompiler` traits.
//!
//! | Concern            | postgres                     | sqlite                      |
//! |--------------------|------------------------------|-----------------------------|
//! | identifier quote   | `"`                          | `"`                         |
//! | boolean literal    | `TRUE` / `FALSE`             | `1` / `0`                   |
//! | bytes literal      | `'\x..'::bytea`              | `X'..'`                     |
//! | REPLACE            | unsupported                  | `INSERT OR REPLACE`         |
//! | TRUNCATE           | `TRUNCATE t`                 | `DELETE FROM t`             |

mod postgres;
mod sqlite;

pub use self::postgres::PostgresDialect;
pub use self::sqlite::SqliteDialect;

use enum_dispatch::enum_dispatch;

use super::escape::{escape_like_wildcards, escape_string, quote_identifier};
use super::schema::{FieldSpec, FieldType};
use super::value::Value;

/// Statement and literal rendering for one database engine.
#[enum_dispatch]
pub trait Dialect {
    /// Platform name, e.g. `postgre`, `sqlite`.
    fn platform(&self) -> &'static str;

    fn identifier_quote(&self) -> char {
        '"'
    }

    fn like_escape_char(&self) -> char {
        '!'
    }

    /// Suffix appended to every rendered LIKE predicate.
    fn like_escape_suffix(&self) -> String {
        format!(" ESCAPE '{}'", self.like_escape_char())
    }

    fn bool_literal(&self, value: bool) -> String;

    fn bytes_literal(&self, bytes: &[u8]) -> String;

    /// Quote a plain identifier, or each part of a dotted one.
    ///
    /// `*` and parts that are already quoted pass through untouched.
    fn escape_identifier(&self, item: &str) -> String {
        let q = self.identifier_quote();
        item.split('.')
            .map(|part| {
                let part = part.trim();
                if part == "*" || part.starts_with(q) || part.is_empty() {
                    part.to_string()
                } else {
                    quote_identifier(part, q)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quote identifiers in a column or table expression.
    ///
    /// Handles `table.column`, `expr AS alias` and `table alias`. Anything
    /// that looks like an expression (function call, literal, number) is
    /// left as written.
    fn protect_identifiers(&self, item: &str) -> String {
        let item = item.trim();
        if item.is_empty()
            || item.contains('(')
            || item.contains('\'')
            || item.parse::<f64>().is_ok()
        {
            return item.to_string();
        }

        let lower = item.to_ascii_lowercase();
        if let Some(pos) = lower.find(" as ") {
            let (left, alias) = (&item[..pos], &item[pos + 4..]);
            return format!(
                "{} AS {}",
                self.escape_identifier(left),
                self.escape_identifier(alias)
            );
        }

        if let Some(pos) = item.rfind(' ') {
            let (left, alias) = (&item[..pos], &item[pos + 1..]);
            return format!(
                "{} {}",
                self.escape_identifier(left.trim()),
                self.escape_identifier(alias)
            );
        }

        self.escape_identifier(item)
    }

    /// Escape a string for inclusion in a literal, without quotes.
    ///
    /// With `like` set, LIKE wildcards are escaped with `like_escape_char`.
    fn escape_str(&self, s: &str, like: bool) -> String {
        let escaped = escape_string(s);
        if like {
            escape_like_wildcards(&escaped, self.like_escape_char())
        } else {
            escaped
        }
    }

    /// Render a value as a SQL literal.
    fn escape_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.bool_literal(*b),
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.is_finite() => f.to_string(),
            Value::Float(_) => "NULL".to_string(),
            Value::Text(s) => format!("'{}'", self.escape_str(s, false)),
            Value::Bytes(b) => self.bytes_literal(b),
        }
    }

    fn random_keyword(&self) -> &'static str {
        "RANDOM()"
    }

    /// Append the LIMIT clause. OFFSET only appears when `offset > 0`.
    fn limit_clause(&self, sql: &str, limit: u64, offset: u64) -> String {
        let mut sql = format!("{} LIMIT {}", sql, limit);
        if offset > 0 {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }

    fn insert_sql(&self, table: &str, keys: &[String], values: &[String]) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            keys.join(", "),
            values.join(", ")
        )
    }

    /// `rows` holds one rendered `(v1, v2, ...)` group per row.
    fn insert_batch_sql(&self, table: &str, keys: &[String], rows: &[String]) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            keys.join(", "),
            rows.join(", ")
        )
    }

    /// `None` when the engine has no REPLACE equivalent.
    fn replace_sql(&self, table: &str, keys: &[String], values: &[String]) -> Option<String>;

    fn update_sql(&self, table: &str, sets: &[(String, String)], where_sql: &str) -> String {
        let assignments = sets
            .iter()
            .map(|(k, v)| format!("{} = {}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("UPDATE {} SET {}", table, assignments);
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(where_sql);
        }
        sql
    }

    /// Multi-row update keyed on `index`, rendered as one CASE per column.
    ///
    /// `rows` are (column, rendered value) pairs and must all contain
    /// `index`; `where_sql` is ANDed onto the generated IN filter.
    fn update_batch_sql(
        &self,
        table: &str,
        rows: &[Vec<(String, String)>],
        index: &str,
        where_sql: &str,
    ) -> String {
        let mut columns: Vec<&str> = Vec::new();
        for row in rows {
            for (k, _) in row {
                if k != index && !columns.contains(&k.as_str()) {
                    columns.push(k);
                }
            }
        }

        let mut ids = Vec::new();
        for row in rows {
            if let Some((_, v)) = row.iter().find(|(k, _)| k == index) {
                ids.push(v.clone());
            }
        }

        let cases = columns
            .iter()
            .map(|col| {
                let whens = rows
                    .iter()
                    .filter_map(|row| {
                        let id = row.iter().find(|(k, _)| k == index)?;
                        let val = row.iter().find(|(k, _)| k == col)?;
                        Some(format!("WHEN {} = {} THEN {}", index, id.1, val.1))
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{} = CASE {} ELSE {} END", col, whens, col)
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "UPDATE {} SET {} WHERE {} IN ({})",
            table,
            cases,
            index,
            ids.join(", ")
        );
        if !where_sql.is_empty() {
            sql.push_str(" AND ");
            sql.push_str(where_sql);
        }
        sql
    }

    fn delete_sql(&self, table: &str, where_sql: &str) -> String {
        if where_sql.is_empty() {
            format!("DELETE FROM {}", table)
        } else {
            format!("DELETE FROM {} WHERE {}", table, where_sql)
        }
    }

    fn truncate_sql(&self, table: &str) -> String;

    fn count_all_sql(&self, table: &str) -> String {
        format!("SELECT COUNT(*) AS numrows FROM {}", table)
    }

    /// List user tables, optionally restricted to a name prefix.
    fn list_tables_sql(&self, prefix: Option<&str>) -> String;

    fn list_columns_sql(&self, table: &str) -> String;

    /// Column of `list_columns_sql` holding the column name.
    fn list_columns_key(&self) -> &'static str;
}

/// DDL rendering for the schema forge.
#[enum_dispatch]
pub trait DdlCompiler {
    /// Engine type for a semantic field type, including constraint.
    fn column_type(&self, field: &FieldSpec) -> String;

    /// Whether the column type already declares the primary key inline.
    fn inline_primary_key(&self, _field: &FieldSpec) -> bool {
        false
    }

    fn column_definition(&self, field: &FieldSpec) -> String;

    fn create_table_sql(
        &self,
        table: &str,
        fields: &[FieldSpec],
        raw_fields: &[String],
        primary_keys: &[String],
        if_not_exists: bool,
    ) -> String;

    fn create_index_sql(&self, table: &str, column: &str) -> String;

    fn drop_table_sql(&self, table: &str, if_exists: bool) -> String;

    fn rename_table_sql(&self, from: &str, to: &str) -> String;

    fn add_column_sql(&self, table: &str, field: &FieldSpec) -> String;

    fn drop_column_sql(&self, table: &str, column: &str) -> String;

    /// `None` when the engine cannot alter a column in place.
    fn modify_column_sql(&self, table: &str, field: &FieldSpec) -> Option<Vec<String>>;

    fn create_database_sql(&self, name: &str) -> Option<String>;

    fn drop_database_sql(&self, name: &str) -> Option<String>;

    fn list_databases_sql(&self) -> Option<String>;

    fn optimize_table_sql(&self, table: &str) -> Option<String>;

    fn repair_table_sql(&self, _table: &str) -> Option<String> {
        None
    }
}

/// The closed set of dialects, dispatched statically.
#[enum_dispatch(Dialect, DdlCompiler)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres(PostgresDialect),
    Sqlite(SqliteDialect),
}

/// Shared column definition body: `"name" TYPE [DEFAULT x] [NOT NULL]`.
pub(crate) fn default_column_definition<D: Dialect + DdlCompiler + ?Sized>(
    dialect: &D,
    field: &FieldSpec,
) -> String {
    let mut def = format!(
        "{} {}",
        dialect.escape_identifier(&field.name),
        dialect.column_type(field)
    );
    if let Some(default) = &field.default {
        def.push_str(" DEFAULT ");
        def.push_str(&dialect.escape_value(default));
    }
    if !field.null && !field.auto_increment {
        def.push_str(" NOT NULL");
    } else if field.null {
        def.push_str(" NULL");
    }
    def
}

/// `VARCHAR` + `(constraint)` when the type takes one.
pub(crate) fn with_constraint(base: &str, field: &FieldSpec, fallback: Option<&str>) -> String {
    match field.constraint.as_deref().or(fallback) {
        Some(c) => format!("{}({})", base, c),
        None => base.to_string(),
    }
}

/// Types that carry a length/precision constraint.
pub(crate) fn takes_constraint(field_type: FieldType) -> bool {
    matches!(
        field_type,
        FieldType::Varchar | FieldType::Char | FieldType::Decimal
    )
}
