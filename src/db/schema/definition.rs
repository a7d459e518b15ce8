//! Column definitions for the schema forge.
//!
//! A `FieldSpec` describes one column in engine-neutral terms. Dialects turn
//! it into DDL through `DdlCompiler::column_definition`.

use crate::db::value::Value;

/// Semantic column type.
///
/// Dialects map each variant to their native type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal,
    Varchar,
    Char,
    Text,
    Bool,
    Date,
    DateTime,
    Timestamp,
    Blob,
}

impl FieldType {
    /// Parse a type name as written in legacy field dictionaries
    /// (`INT`, `varchar`, `DATETIME`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name.trim().to_ascii_uppercase().as_str() {
            "TINYINT" => FieldType::TinyInt,
            "SMALLINT" => FieldType::SmallInt,
            "INT" | "INTEGER" | "MEDIUMINT" => FieldType::Int,
            "BIGINT" => FieldType::BigInt,
            "FLOAT" | "REAL" => FieldType::Float,
            "DOUBLE" => FieldType::Double,
            "DECIMAL" | "NUMERIC" => FieldType::Decimal,
            "VARCHAR" => FieldType::Varchar,
            "CHAR" => FieldType::Char,
            "TEXT" | "MEDIUMTEXT" | "LONGTEXT" => FieldType::Text,
            "BOOL" | "BOOLEAN" => FieldType::Bool,
            "DATE" => FieldType::Date,
            "DATETIME" => FieldType::DateTime,
            "TIMESTAMP" => FieldType::Timestamp,
            "BLOB" | "BYTEA" => FieldType::Blob,
            _ => return None,
        };
        Some(ty)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::TinyInt
                | FieldType::SmallInt
                | FieldType::Int
                | FieldType::BigInt
                | FieldType::Float
                | FieldType::Double
                | FieldType::Decimal
        )
    }
}

/// One column: type, constraint, nullability, default and auto-increment.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    /// Target name when a `modify_column` also renames.
    pub new_name: Option<String>,
    pub field_type: FieldType,
    /// Length or precision, e.g. `100` or `10,2`.
    pub constraint: Option<String>,
    pub unsigned: bool,
    pub null: bool,
    pub default: Option<Value>,
    pub auto_increment: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            new_name: None,
            field_type,
            constraint: None,
            unsigned: false,
            null: false,
            default: None,
            auto_increment: false,
        }
    }

    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn rename_to(mut self, new_name: impl Into<String>) -> Self {
        self.new_name = Some(new_name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("INT", Some(FieldType::Int))]
    #[case("varchar", Some(FieldType::Varchar))]
    #[case(" DateTime ", Some(FieldType::DateTime))]
    #[case("GEOMETRY", None)]
    fn test_from_name(#[case] name: &str, #[case] expected: Option<FieldType>) {
        assert_eq!(FieldType::from_name(name), expected);
    }

    #[test]
    fn test_is_numeric() {
        assert!(FieldType::Decimal.is_numeric());
        assert!(!FieldType::Varchar.is_numeric());
    }

    #[test]
    fn test_builder_chain() {
        let field = FieldSpec::new("title", FieldType::Varchar)
            .constraint("100")
            .nullable()
            .default("untitled");
        assert_eq!(field.constraint.as_deref(), Some("100"));
        assert!(field.null);
        assert_eq!(field.default, Some(Value::Text("untitled".into())));
        assert!(!field.auto_increment);
    }
}
