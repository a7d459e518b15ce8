//! Command definitions and implementations.
//!
//! Each command is defined in its own module with:
//! - The command struct with clap attributes for CLI parsing
//! - `execute.rs`: the `Execute` impl and its result type
//! - `output.rs`: the `Outputable` impl for that result

mod dispatch;
mod dsn;
mod query;
mod route;
mod url;

pub use dispatch::DispatchCmd;
pub use dsn::DsnCmd;
pub use query::QueryCmd;
pub use route::RouteCmd;
pub use url::UrlCmd;

use clap::Subcommand;
use std::error::Error;
use std::path::{Path, PathBuf};

use crate::config::{AppConfig, ConfigError};
use crate::db::config::DatabaseConfig;
use crate::output::{OutputFormat, Outputable};

/// Where a command finds its configuration.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config_path: PathBuf,
}

impl CommandContext {
    pub fn new(config_path: &Path) -> Self {
        Self {
            config_path: config_path.to_path_buf(),
        }
    }

    /// The configuration file, or defaults when there is none.
    pub fn app_config(&self) -> Result<AppConfig, ConfigError> {
        match AppConfig::load_from(&self.config_path) {
            Err(ConfigError::NotFound(_)) => Ok(AppConfig::default()),
            other => other,
        }
    }

    /// Database groups: config file > `DATABASE_URL` > in-memory SQLite.
    pub fn database_config(&self) -> Result<DatabaseConfig, ConfigError> {
        DatabaseConfig::resolve_from(&self.config_path)
    }
}

/// Trait for executing commands with command-specific result types.
pub trait Execute {
    type Output: Outputable;

    fn execute(self, ctx: &CommandContext) -> Result<Self::Output, Box<dyn Error>>;
}

/// Parse a `key=value` argument.
pub(crate) fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a URI path to its routed segments and controller/action
    Route(RouteCmd),

    /// Build a URL for a route and parameters
    Url(UrlCmd),

    /// Parse a database connection string
    Dsn(DsnCmd),

    /// Run a SQL statement against a configured connection group
    Query(QueryCmd),

    /// Dispatch a path through the demo application
    Dispatch(DispatchCmd),

    /// Catch-all for unknown commands
    #[command(external_subcommand)]
    Unknown(Vec<String>),
}

impl Command {
    /// Execute the command and return formatted output
    pub fn run(self, ctx: &CommandContext, format: OutputFormat) -> Result<String, Box<dyn Error>> {
        match self {
            Command::Route(cmd) => {
                let result = cmd.execute(ctx)?;
                Ok(result.format(format))
            }
            Command::Url(cmd) => {
                let result = cmd.execute(ctx)?;
                Ok(result.format(format))
            }
            Command::Dsn(cmd) => {
                let result = cmd.execute(ctx)?;
                Ok(result.format(format))
            }
            Command::Query(cmd) => {
                let result = cmd.execute(ctx)?;
                Ok(result.format(format))
            }
            Command::Dispatch(cmd) => {
                let result = cmd.execute(ctx)?;
                Ok(result.format(format))
            }
            Command::Unknown(args) => {
                Err(format!("Unknown command: {}", args.first().unwrap_or(&String::new())).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;
    use rstest::rstest;

    #[rstest]
    #[case("id=5", Ok(("id".to_string(), "5".to_string())))]
    #[case("q=a=b", Ok(("q".to_string(), "a=b".to_string())))]
    #[case("novalue", Err(()))]
    #[case("=x", Err(()))]
    fn test_parse_key_val(#[case] input: &str, #[case] expected: Result<(String, String), ()>) {
        assert_eq!(parse_key_val(input).map_err(|_| ()), expected);
    }

    #[rstest]
    fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CommandContext::new(&dir.path().join("absent.json"));
        let config = ctx.app_config().unwrap();
        assert_eq!(config.routes().default_controller, "site");
    }

    #[rstest]
    fn test_unknown_command() {
        let args = Args::try_parse_from(["mvc_core", "frobnicate"]).unwrap();
        let ctx = CommandContext::new(Path::new("absent.json"));
        let err = args.command.run(&ctx, OutputFormat::Table).unwrap_err();
        assert_eq!(err.to_string(), "Unknown command: frobnicate");
    }
}
