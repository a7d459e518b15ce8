mod execute;
mod output;
mod output_tests;

use clap::Args;

/// Resolve a URI path to its routed segments and controller/action
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  mvc_core route /user/view/5                   # Segments, controller and action
  mvc_core route /product/12 -r 'product/(:num)=catalog/product_lookup/$1'
  mvc_core route / --format json                # Default controller")]
pub struct RouteCmd {
    /// Request path, e.g. /user/view/5
    pub path: String,

    /// Extra rewrite rule `pattern=target`, tried after the configured ones
    #[arg(short, long = "rule", value_parser = crate::commands::parse_key_val)]
    pub rules: Vec<(String, String)>,
}
