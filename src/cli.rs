//! CLI argument definitions.
//!
//! This module contains the top-level CLI structure and shared types.
//! Individual command definitions are in the `commands` module.

use clap::Parser;
use std::path::PathBuf;

use crate::commands::Command;
use crate::config::CONFIG_FILE_NAME;
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = CONFIG_FILE_NAME, global = true)]
    pub config: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    pub format: OutputFormat,

    /// Log filter, e.g. `debug` or `mvc_core=trace` (RUST_LOG wins)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_global_defaults() {
        let args = Args::try_parse_from(["mvc_core", "dsn", "sqlite::memory:"]).unwrap();
        assert_eq!(args.config, PathBuf::from(CONFIG_FILE_NAME));
        assert_eq!(args.format, OutputFormat::Table);
        assert!(args.log_level.is_none());
    }

    #[rstest]
    #[case("json", OutputFormat::Json)]
    #[case("toon", OutputFormat::Toon)]
    fn test_format_after_subcommand(#[case] value: &str, #[case] expected: OutputFormat) {
        let args = Args::try_parse_from(["mvc_core", "dsn", "sqlite::memory:", "--format", value]).unwrap();
        assert_eq!(args.format, expected);
    }

    #[rstest]
    fn test_unknown_format_rejected() {
        assert!(Args::try_parse_from(["mvc_core", "--format", "xml", "dsn", "x"]).is_err());
    }
}
