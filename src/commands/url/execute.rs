use std::error::Error;

use serde::Serialize;

use super::UrlCmd;
use crate::commands::{CommandContext, Execute};
use crate::web::{UrlFormat, UrlManager};

/// Result of the url command execution
#[derive(Debug, Serialize)]
pub struct UrlResult {
    pub route: String,
    pub format: UrlFormat,
    pub url: String,
}

impl Execute for UrlCmd {
    type Output = UrlResult;

    fn execute(self, ctx: &CommandContext) -> Result<Self::Output, Box<dyn Error>> {
        let mut uri = ctx.app_config()?.uri().clone();
        if let Some(base_url) = self.base_url {
            uri.base_url = base_url;
        }
        if let Some(style) = self.style {
            uri.url_format = style.into();
        }

        let urls = UrlManager::new(uri);
        let params: Vec<(&str, &str)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let url = urls.create_url(&self.route, &params, self.anchor.as_deref());

        Ok(UrlResult {
            route: self.route,
            format: urls.format(),
            url,
        })
    }
}
