//! Database maintenance and export helpers.

use std::fmt::Write as _;

use crate::db::connection::Connection;
use crate::db::dialect::{DdlCompiler, Dialect};
use crate::db::result::ResultCursor;
use crate::db::value::{DatabaseValue, Value};
use crate::db::DbError;

use super::SchemaError;

/// What `Utility::backup` dumps.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Tables to dump; empty dumps every table.
    pub tables: Vec<String>,
    /// Tables skipped even when listed or found.
    pub ignore: Vec<String>,
    /// Emit `DROP TABLE IF EXISTS` before each table's rows.
    pub add_drop: bool,
    pub add_insert: bool,
    pub newline: String,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            ignore: Vec::new(),
            add_drop: true,
            add_insert: true,
            newline: "\n".to_string(),
        }
    }
}

/// Element names and whitespace for `xml_from_result`.
#[derive(Debug, Clone)]
pub struct XmlOptions {
    pub root: String,
    pub element: String,
    pub newline: String,
    pub tab: String,
}

impl Default for XmlOptions {
    fn default() -> Self {
        Self {
            root: "root".to_string(),
            element: "element".to_string(),
            newline: "\n".to_string(),
            tab: "\t".to_string(),
        }
    }
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub struct Utility<'c> {
    conn: &'c mut Connection,
}

impl<'c> Utility<'c> {
    pub fn new(conn: &'c mut Connection) -> Self {
        Self { conn }
    }

    fn unsupported(&self, operation: &'static str) -> DbError {
        SchemaError::Unsupported {
            platform: self.conn.platform(),
            operation,
        }
        .into()
    }

    pub fn list_databases(&mut self) -> Result<Vec<String>, DbError> {
        let sql = self
            .conn
            .dialect()
            .list_databases_sql()
            .ok_or_else(|| self.unsupported("list_databases"))?;
        let cursor = self.conn.query(&sql)?;
        Ok(cursor
            .result_array()
            .iter()
            .filter_map(|row| row.get_index(0))
            .filter_map(|v| v.as_string())
            .collect())
    }

    pub fn database_exists(&mut self, name: &str) -> Result<bool, DbError> {
        Ok(self.list_databases()?.iter().any(|db| db == name))
    }

    pub fn optimize_table(&mut self, table: &str) -> Result<(), DbError> {
        if table.trim().is_empty() {
            return Err(SchemaError::MissingTableName.into());
        }
        let sql = self
            .conn
            .dialect()
            .optimize_table_sql(&self.conn.protect_table(table))
            .ok_or_else(|| self.unsupported("optimize_table"))?;
        self.conn.execute(&sql).map(|_| ())
    }

    /// Optimize every table. Engines that only optimize the whole database
    /// run their statement once.
    pub fn optimize_database(&mut self) -> Result<usize, DbError> {
        let dialect = self.conn.dialect();
        let mut statements: Vec<String> = Vec::new();
        for table in self.conn.list_tables(false)? {
            let sql = dialect
                .optimize_table_sql(&dialect.protect_identifiers(&table))
                .ok_or_else(|| self.unsupported("optimize_table"))?;
            if !statements.contains(&sql) {
                statements.push(sql);
            }
        }
        for sql in &statements {
            self.conn.execute(sql)?;
        }
        Ok(statements.len())
    }

    pub fn repair_table(&mut self, table: &str) -> Result<(), DbError> {
        if table.trim().is_empty() {
            return Err(SchemaError::MissingTableName.into());
        }
        let sql = self
            .conn
            .dialect()
            .repair_table_sql(&self.conn.protect_table(table))
            .ok_or_else(|| self.unsupported("repair_table"))?;
        self.conn.execute(&sql).map(|_| ())
    }

    /// Render a result as CSV with a header row.
    ///
    /// Every cell is wrapped in `enclosure`, which is doubled inside it.
    pub fn csv_from_result(
        &self,
        cursor: &ResultCursor,
        delim: &str,
        newline: &str,
        enclosure: &str,
    ) -> String {
        let enclose = |s: &str| {
            format!(
                "{e}{}{e}",
                s.replace(enclosure, &enclosure.repeat(2)),
                e = enclosure
            )
        };

        let mut out = cursor
            .row_columns()
            .iter()
            .map(|c| enclose(c))
            .collect::<Vec<_>>()
            .join(delim);
        out.push_str(newline);

        for row in cursor.result_array() {
            let line = row
                .values()
                .iter()
                .map(|v| enclose(&cell_text(v)))
                .collect::<Vec<_>>()
                .join(delim);
            out.push_str(&line);
            out.push_str(newline);
        }
        out
    }

    pub fn xml_from_result(&self, cursor: &ResultCursor, options: &XmlOptions) -> String {
        let XmlOptions {
            root,
            element,
            newline,
            tab,
        } = options;

        let mut out = format!("<{}>{}", root, newline);
        for row in cursor.result_array() {
            let _ = write!(out, "{}<{}>{}", tab, element, newline);
            for (key, value) in row.iter() {
                let _ = write!(
                    out,
                    "{tab}{tab}<{key}>{}</{key}>{newline}",
                    xml_escape(&cell_text(value)),
                );
            }
            let _ = write!(out, "{}</{}>{}", tab, element, newline);
        }
        let _ = write!(out, "</{}>{}", root, newline);
        out
    }

    /// Dump tables as SQL statements.
    pub fn backup(&mut self, options: &BackupOptions) -> Result<String, DbError> {
        let tables = if options.tables.is_empty() {
            self.conn.list_tables(false)?
        } else {
            options.tables.clone()
        };
        let nl = &options.newline;
        let dialect = self.conn.dialect();

        let mut out = String::new();
        for table in tables.iter().filter(|t| !options.ignore.contains(t)) {
            let protected = self.conn.protect_table(table);
            let _ = write!(out, "--{nl}-- Table {}{nl}--{nl}{nl}", table);

            if options.add_drop {
                let _ = write!(out, "{};{nl}{nl}", dialect.drop_table_sql(&protected, true));
            }
            if !options.add_insert {
                continue;
            }

            let cursor = self.conn.query(&format!("SELECT * FROM {}", protected))?;
            let keys: Vec<String> = cursor
                .row_columns()
                .iter()
                .map(|c| dialect.escape_identifier(c))
                .collect();
            for row in cursor.result_array() {
                let values: Vec<String> =
                    row.values().iter().map(|v| dialect.escape_value(v)).collect();
                let _ = write!(out, "{};{nl}", dialect.insert_sql(&protected, &keys, &values));
            }
            out.push_str(nl);
        }
        Ok(out)
    }
}
