//! PostgreSQL dialect.

use super::{
    default_column_definition, takes_constraint, with_constraint, DdlCompiler, Dialect,
};
use crate::db::schema::{FieldSpec, FieldType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn platform(&self) -> &'static str {
        "postgre"
    }

    fn bool_literal(&self, value: bool) -> String {
        if value { "TRUE" } else { "FALSE" }.to_string()
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        format!("'\\x{}'::bytea", hex::encode(bytes))
    }

    fn replace_sql(&self, _table: &str, _keys: &[String], _values: &[String]) -> Option<String> {
        None
    }

    fn truncate_sql(&self, table: &str) -> String {
        format!("TRUNCATE {}", table)
    }

    fn list_tables_sql(&self, prefix: Option<&str>) -> String {
        let mut sql = "SELECT \"table_name\" FROM \"information_schema\".\"tables\" \
                       WHERE \"table_schema\" = 'public'"
            .to_string();
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            sql.push_str(&format!(
                " AND \"table_name\" LIKE '{}%'{}",
                self.escape_str(prefix, true),
                self.like_escape_suffix()
            ));
        }
        sql
    }

    fn list_columns_sql(&self, table: &str) -> String {
        format!(
            "SELECT \"column_name\" FROM \"information_schema\".\"columns\" \
             WHERE \"table_name\" = '{}' ORDER BY \"ordinal_position\"",
            self.escape_str(table, false)
        )
    }

    fn list_columns_key(&self) -> &'static str {
        "column_name"
    }
}

impl DdlCompiler for PostgresDialect {
    fn column_type(&self, field: &FieldSpec) -> String {
        if field.auto_increment {
            return match field.field_type {
                FieldType::BigInt => "BIGSERIAL".to_string(),
                _ => "SERIAL".to_string(),
            };
        }
        let base = match field.field_type {
            FieldType::TinyInt | FieldType::SmallInt => "SMALLINT",
            FieldType::Int => "INTEGER",
            FieldType::BigInt => "BIGINT",
            FieldType::Float => "REAL",
            FieldType::Double => "DOUBLE PRECISION",
            FieldType::Decimal => "NUMERIC",
            FieldType::Varchar => "VARCHAR",
            FieldType::Char => "CHAR",
            FieldType::Text => "TEXT",
            FieldType::Bool => "BOOLEAN",
            FieldType::Date => "DATE",
            FieldType::DateTime | FieldType::Timestamp => "TIMESTAMP",
            FieldType::Blob => "BYTEA",
        };
        if takes_constraint(field.field_type) {
            let fallback = matches!(field.field_type, FieldType::Varchar).then_some("255");
            with_constraint(base, field, fallback)
        } else {
            base.to_string()
        }
    }

    fn column_definition(&self, field: &FieldSpec) -> String {
        let mut def = default_column_definition(self, field);
        // No unsigned integers in postgres; emulate with a check constraint.
        if field.unsigned && field.field_type.is_numeric() {
            def.push_str(&format!(
                " CHECK ({} >= 0)",
                self.escape_identifier(&field.name)
            ));
        }
        def
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
        if !primary_keys.is_empty() {
            let keys = primary_keys
                .iter()
                .map(|k| self.escape_identifier(k))
                .collect::<Vec<_>>()
                .join(", ");
            columns.push(format!("PRIMARY KEY ({})", keys));
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

    fn modify_column_sql(&self, table: &str, field: &FieldSpec) -> Option<Vec<String>> {
        let column = self.escape_identifier(&field.name);
        let mut statements = vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
            table,
            column,
            self.column_type(field)
        )];
        statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL",
            table,
            column,
            if field.null { "DROP" } else { "SET" }
        ));
        if let Some(default) = &field.default {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                table,
                column,
                self.escape_value(default)
            ));
        }
        if let Some(new_name) = &field.new_name {
            statements.push(format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                table,
                column,
                self.escape_identifier(new_name)
            ));
        }
        Some(statements)
    }

    fn create_database_sql(&self, name: &str) -> Option<String> {
        Some(format!("CREATE DATABASE {}", self.escape_identifier(name)))
    }

    fn drop_database_sql(&self, name: &str) -> Option<String> {
        Some(format!("DROP DATABASE {}", self.escape_identifier(name)))
    }

    fn list_databases_sql(&self) -> Option<String> {
        Some("SELECT \"datname\" FROM \"pg_database\" WHERE NOT \"datistemplate\"".to_string())
    }

    fn optimize_table_sql(&self, table: &str) -> Option<String> {
        Some(format!("VACUUM ANALYZE {}", table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::value::Value;

    #[test]
    fn test_auto_increment_uses_serial() {
        let field = FieldSpec::new("id", FieldType::Int).auto_increment();
        assert_eq!(PostgresDialect.column_type(&field), "SERIAL");
        let field = FieldSpec::new("id", FieldType::BigInt).auto_increment();
        assert_eq!(PostgresDialect.column_type(&field), "BIGSERIAL");
    }

    #[test]
    fn test_varchar_defaults_to_255() {
        let field = FieldSpec::new("name", FieldType::Varchar);
        assert_eq!(PostgresDialect.column_type(&field), "VARCHAR(255)");
    }

    #[test]
    fn test_unsigned_becomes_check_constraint() {
        let field = FieldSpec::new("age", FieldType::Int).unsigned();
        assert_eq!(
            PostgresDialect.column_definition(&field),
            "\"age\" INTEGER NOT NULL CHECK (\"age\" >= 0)"
        );
    }

    #[test]
    fn test_create_table_with_primary_key() {
        let fields = vec![
            FieldSpec::new("uid", FieldType::Int).auto_increment(),
            FieldSpec::new("username", FieldType::Varchar)
                .constraint("100")
                .default(Value::from("")),
        ];
        let sql = PostgresDialect.create_table_sql("\"user\"", &fields, &[], &["uid".into()], true);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"user\" (\"uid\" SERIAL, \
             \"username\" VARCHAR(100) DEFAULT '' NOT NULL, PRIMARY KEY (\"uid\"))"
        );
    }

    #[test]
    fn test_replace_is_unsupported() {
        assert!(PostgresDialect.replace_sql("t", &[], &[]).is_none());
    }

    #[test]
    fn test_bytes_literal() {
        assert_eq!(PostgresDialect.bytes_literal(&[0xde, 0xad]), "'\\xdead'::bytea");
    }
}
