use std::error::Error;

use serde::Serialize;

use super::demo;
use super::DispatchCmd;
use crate::commands::{CommandContext, Execute};
use crate::web::{BufferedOutput, Request};

/// Result of the dispatch command execution
#[derive(Debug, Serialize)]
pub struct DispatchResult {
    pub path: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Execute for DispatchCmd {
    type Output = DispatchResult;

    fn execute(self, ctx: &CommandContext) -> Result<Self::Output, Box<dyn Error>> {
        let mut config = ctx.app_config()?;
        if self.query_strings {
            let mut file = config.file().clone();
            file.uri.enable_query_strings = true;
            config = crate::config::AppConfig::from_file(file);
        }

        let app = demo::application(config)?;
        let mut output = BufferedOutput::new();
        let response = app.run(&Request::web(&self.path), &mut output);

        Ok(DispatchResult {
            path: self.path,
            status: response.status,
            headers: response.headers,
            body: response.body,
        })
    }
}
