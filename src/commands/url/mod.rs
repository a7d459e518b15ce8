mod cli_tests;
mod execute;
mod output;

use clap::{Args, ValueEnum};

use crate::web::UrlFormat;

/// URL style, overriding the configured `uri.url_format`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UrlStyle {
    /// base/controller/action/name/value
    Path,
    /// base?c=controller&a=action&name=value
    Get,
}

impl From<UrlStyle> for UrlFormat {
    fn from(style: UrlStyle) -> Self {
        match style {
            UrlStyle::Path => UrlFormat::Path,
            UrlStyle::Get => UrlFormat::Get,
        }
    }
}

/// Build a URL for a route and parameters
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  mvc_core url user/view -p id=5                  # /user/view/id/5
  mvc_core url user/view -p id=5 --style get      # ?c=user&a=view&id=5
  mvc_core url news/view -p id=1 --anchor comments --base-url http://example.com")]
pub struct UrlCmd {
    /// Route as [module/]controller/action
    pub route: String,

    /// Parameter `name=value`, repeatable, kept in order
    #[arg(short, long = "param", value_parser = crate::commands::parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Fragment appended after '#'
    #[arg(long)]
    pub anchor: Option<String>,

    /// Base URL, overriding `uri.base_url`
    #[arg(long)]
    pub base_url: Option<String>,

    /// URL style, overriding `uri.url_format`
    #[arg(short, long, value_enum)]
    pub style: Option<UrlStyle>,
}
