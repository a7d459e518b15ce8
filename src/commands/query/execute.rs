use std::error::Error;

use serde::Serialize;
use tracing::debug;

use super::QueryCmd;
use crate::commands::{CommandContext, Execute};
use crate::db::{is_write_type, ConnectionRegistry, Queryable, Row};

/// Result of the query command execution
#[derive(Debug, Serialize)]
pub struct QueryResult {
    pub group: String,
    pub platform: String,
    /// The statement reported on
    pub sql: String,
    pub statements: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub total_rows: usize,
}

impl Execute for QueryCmd {
    type Output = QueryResult;

    fn execute(self, ctx: &CommandContext) -> Result<Self::Output, Box<dyn Error>> {
        let registry = ConnectionRegistry::new(ctx.database_config()?)?;
        let group = self
            .group
            .unwrap_or_else(|| registry.active_group().to_string());
        let mut conn = registry.connection(&group)?;

        let statements = self.sql.len();
        let (last, earlier) = self
            .sql
            .split_last()
            .ok_or("No SQL statement given")?;
        for sql in earlier {
            conn.execute(sql)?;
        }

        let mut result = QueryResult {
            group,
            platform: conn.platform().to_string(),
            sql: last.clone(),
            statements,
            affected_rows: None,
            columns: Vec::new(),
            rows: Vec::new(),
            total_rows: 0,
        };

        if is_write_type(last) {
            result.affected_rows = Some(conn.execute(last)?);
        } else {
            let cursor = conn.query(last)?;
            let rows = cursor.result_array();
            result.columns = cursor.field_names();
            if result.columns.is_empty() {
                result.columns = rows.first().map(|r| r.columns().to_vec()).unwrap_or_default();
            }
            result.total_rows = cursor.rows_count();
            result.rows = rows
                .iter()
                .take(self.limit as usize)
                .cloned()
                .collect();
        }
        debug!(category = "db", statements, rows = result.total_rows, "query command finished");

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Value;

    fn memory_ctx() -> (tempfile::TempDir, CommandContext) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".mvc_core.json");
        std::fs::write(
            &path,
            r#"{"database": {"groups": {"default": "sqlite::memory:"}}}"#,
        )
        .unwrap();
        let ctx = CommandContext::new(&path);
        (dir, ctx)
    }

    fn cmd(sql: &[&str]) -> QueryCmd {
        QueryCmd {
            sql: sql.iter().map(|s| s.to_string()).collect(),
            group: None,
            limit: 100,
        }
    }

    #[test]
    fn test_select_after_setup_statements() {
        let (_dir, ctx) = memory_ctx();
        let result = cmd(&[
            "CREATE TABLE user (uid INTEGER, username TEXT)",
            "INSERT INTO user VALUES (1, 'zhj'), (2, 'ann')",
            "SELECT username FROM user ORDER BY uid",
        ])
        .execute(&ctx)
        .unwrap();

        assert_eq!(result.platform, "sqlite");
        assert_eq!(result.statements, 3);
        assert_eq!(result.columns, vec!["username"]);
        assert_eq!(result.total_rows, 2);
        assert_eq!(result.rows[0].get("username"), Some(&Value::from("zhj")));
        assert!(result.affected_rows.is_none());
    }

    #[test]
    fn test_write_reports_affected_rows() {
        let (_dir, ctx) = memory_ctx();
        let result = cmd(&[
            "CREATE TABLE t (a INTEGER)",
            "INSERT INTO t VALUES (1), (2), (3)",
        ])
        .execute(&ctx)
        .unwrap();
        assert_eq!(result.affected_rows, Some(3));
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_limit_truncates_rows() {
        let (_dir, ctx) = memory_ctx();
        let mut query = cmd(&[
            "CREATE TABLE t (a INTEGER)",
            "INSERT INTO t VALUES (1), (2), (3)",
            "SELECT a FROM t",
        ]);
        query.limit = 2;
        let result = query.execute(&ctx).unwrap();
        assert_eq!(result.total_rows, 3);
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn test_unknown_group() {
        let (_dir, ctx) = memory_ctx();
        let mut query = cmd(&["SELECT 1"]);
        query.group = Some("missing".to_string());
        let err = query.execute(&ctx).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
