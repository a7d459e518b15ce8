mod demo;
mod execute;
mod output;

use clap::Args;

/// Dispatch a request path through the demo application
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  mvc_core dispatch /                        # site/index
  mvc_core dispatch /user/view/id/2          # Reads the seeded user table
  mvc_core dispatch /admin                   # Module default controller
  mvc_core dispatch '/?c=site&a=hello' --query-strings

Routing and URI settings come from the configuration file.")]
pub struct DispatchCmd {
    /// Request URI, optionally with a query string
    pub path: String,

    /// Honour controller/action triggers in the query string
    #[arg(long, default_value_t = false)]
    pub query_strings: bool,
}
