//! SQLite dialect.

use super::{default_column_definition, takes_constraint, with_constraint, DdlCompiler, Dialect};
use crate::db::schema::{FieldSpec, FieldType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn platform(&self) -> &'static str {
        "sqlite"
    }

    fn bool_literal(&self, value: bool) -> String {
        if value { "1" } else { "0" }.to_string()
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        format!("X'{}'", hex::encode(bytes))
    }

    fn replace_sql(&self, table: &str, keys: &[String], values: &[String]) -> Option<String> {
        Some(format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            table,
            keys.join(", "),
            values.join(", ")
        ))
    }

    fn truncate_sql(&self, table: &str) -> String {
        format!("DELETE FROM {}", table)
    }

    fn list_tables_sql(&self, prefix: Option<&str>) -> String {
        let mut sql = "SELECT \"name\" FROM \"sqlite_master\" WHERE \"type\" = 'table' \
                       AND \"name\" NOT LIKE 'sqlite!_%' ESCAPE '!'"
            .to_string();
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            sql.push_str(&format!(
                " AND \"name\" LIKE '{}%'{}",
                self.escape_str(prefix, true),
                self.like_escape_suffix()
            ));
        }
        sql
    }

    fn list_columns_sql(&self, table: &str) -> String {
        format!("PRAGMA table_info({})", self.escape_identifier(table))
    }

    fn list_columns_key(&self) -> &'static str {
        "name"
    }
}

impl DdlCompiler for SqliteDialect {
    fn column_type(&self, field: &FieldSpec) -> String {
        if field.auto_increment {
            return "INTEGER PRIMARY KEY AUTOINCREMENT".to_string();
        }
        let base = match field.field_type {
            FieldType::TinyInt | FieldType::SmallInt | FieldType::Int | FieldType::BigInt => {
                "INTEGER"
            }
            FieldType::Float | FieldType::Double => "REAL",
            FieldType::Decimal => "NUMERIC",
            FieldType::Varchar => "VARCHAR",
            FieldType::Char => "CHAR",
            FieldType::Text => "TEXT",
            FieldType::Bool => "BOOLEAN",
            FieldType::Date => "DATE",
            FieldType::DateTime | FieldType::Timestamp => "DATETIME",
            FieldType::Blob => "BLOB",
        };
        if takes_constraint(field.field_type) {
            with_constraint(base, field, None)
        } else {
            base.to_string()
        }
    }

    fn inline_primary_key(&self, field: &FieldSpec) -> bool {
        field.auto_increment
    }

    fn column_definition(&self, field: &FieldSpec) -> String {
        default_column_definition(self, field)
    }

    fn create_table_sql(
        &self,
        table: &str,
        fields: &[FieldSpec],
        raw_fields: &[String],
        primary_keys: &[String],
        if_not_exists: bool,
    ) -> String {
        let mut columns: Vec<String> = fields.iter().map(|f| self.column_definition(f)).collect();
        columns.extend(raw_fields.iter().cloned());

        // AUTOINCREMENT columns already carry PRIMARY KEY inline.
        let inline: Vec<&str> = fields
            .iter()
            .filter(|f| self.inline_primary_key(f))
            .map(|f| f.name.as_str())
            .collect();
        let keys: Vec<String> = primary_keys
            .iter()
            .filter(|k| !inline.contains(&k.as_str()))
            .map(|k| self.escape_identifier(k))
            .collect();
        if !keys.is_empty() {
            columns.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        format!(
            "CREATE TABLE {}{} ({})",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            table,
            columns.join(", ")
        )
    }

    fn create_index_sql(&self, table: &str, column: &str) -> String {
        let plain_table = table.trim_matches('"');
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.escape_identifier(&format!("{}_{}_idx", plain_table, column)),
            table,
            self.escape_identifier(column)
        )
    }

    fn drop_table_sql(&self, table: &str, if_exists: bool) -> String {
        format!(
            "DROP TABLE {}{}",
            if if_exists { "IF EXISTS " } else { "" },
            table
        )
    }

    fn rename_table_sql(&self, from: &str, to: &str) -> String {
        format!("ALTER TABLE {} RENAME TO {}", from, to)
    }

    fn add_column_sql(&self, table: &str, field: &FieldSpec) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            table,
            self.column_definition(field)
        )
    }

    fn drop_column_sql(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            table,
            self.escape_identifier(column)
        )
    }

    fn modify_column_sql(&self, _table: &str, _field: &FieldSpec) -> Option<Vec<String>> {
        None
    }

    fn create_database_sql(&self, _name: &str) -> Option<String> {
        None
    }

    fn drop_database_sql(&self, _name: &str) -> Option<String> {
        None
    }

    fn list_databases_sql(&self) -> Option<String> {
        None
    }

    fn optimize_table_sql(&self, _table: &str) -> Option<String> {
        Some("VACUUM".to_string())
    }
}
