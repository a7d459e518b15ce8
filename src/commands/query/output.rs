//! Output formatting for query command results.

use super::execute::QueryResult;
use crate::output::{render_grid, Outputable};

impl Outputable for QueryResult {
    fn to_table(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Query [{}:{}]: {}", self.group, self.platform, self.sql));
        lines.push(String::new());

        if let Some(affected) = self.affected_rows {
            lines.push(format!("Affected rows: {}", affected));
            return lines.join("\n");
        }

        if self.rows.is_empty() {
            lines.push("No rows.".to_string());
            return lines.join("\n");
        }

        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.values().iter().map(ToString::to_string).collect())
            .collect();
        lines.push(render_grid(&self.columns, &rows));
        lines.push(String::new());

        if self.rows.len() < self.total_rows {
            lines.push(format!("({} of {} rows)", self.rows.len(), self.total_rows));
        } else {
            lines.push(format!("({} rows)", self.total_rows));
        }

        lines.join("\n")
    }
}
