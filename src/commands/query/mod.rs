mod cli_tests;
mod execute;
mod output;

use clap::Args;

/// Run SQL statements against a configured connection group
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  mvc_core query 'SELECT * FROM users'               # Default group
  mvc_core query 'SELECT count(*) FROM orders' -g reporting
  mvc_core query 'CREATE TABLE t (a INT)' 'INSERT INTO t VALUES (1)' 'SELECT a FROM t'

Statements run in order on one connection; the last one is reported.")]
pub struct QueryCmd {
    /// SQL statements, run in order
    #[arg(required = true)]
    pub sql: Vec<String>,

    /// Connection group (defaults to the active group)
    #[arg(short, long)]
    pub group: Option<String>,

    /// Maximum number of rows to show (1-10000)
    #[arg(short, long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..=10000))]
    pub limit: u32,
}
