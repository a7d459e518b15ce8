//! CLI parsing tests for query command using the test DSL.

#[cfg(test)]
mod tests {
    use crate::cli::Args;
    use clap::Parser;
    use rstest::rstest;

    crate::cli_reject_test! {
        test_query_requires_sql: ["query"] mentions "<SQL>"
    }

    crate::cli_parse_test! {
        test_query_defaults: Query ["query", "SELECT 1"] => {
            sql: vec!["SELECT 1".to_string()],
            group: None::<String>,
        }
    }

    crate::cli_parse_test! {
        test_query_with_group: Query ["query", "SELECT 1", "-g", "reporting"] => {
            group: Some("reporting".to_string()),
        }
    }

    crate::cli_parse_test! {
        test_query_multiple_statements: Query ["query", "CREATE TABLE t (a INT)", "SELECT a FROM t"] => {
            sql: vec!["CREATE TABLE t (a INT)".to_string(), "SELECT a FROM t".to_string()],
        }
    }

    crate::cli_limit_tests! {
        Query ["query", "SELECT 1"],
        limit: { default: 100, max: 10000 },
    }
}
