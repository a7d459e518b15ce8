use std::error::Error;

use serde::Serialize;

use super::RouteCmd;
use crate::commands::{CommandContext, Execute};
use crate::web::router::{RouteRule, Router};
use crate::web::uri::Assoc;
use crate::web::{Request, Route, Uri};

/// Result of the route command execution
#[derive(Debug, Serialize)]
pub struct RouteResult {
    pub path: String,
    pub uri_string: String,
    pub segments: Vec<String>,
    pub rsegments: Vec<String>,
    pub controller: String,
    pub action: String,
    pub controller_class: String,
    pub action_method: String,
    pub params: Vec<String>,
    /// Parameters after the action read as name/value pairs
    pub named: Assoc,
}

impl Execute for RouteCmd {
    type Output = RouteResult;

    fn execute(self, ctx: &CommandContext) -> Result<Self::Output, Box<dyn Error>> {
        let config = ctx.app_config()?;

        let mut routes = config.routes().clone();
        routes
            .rules
            .extend(self.rules.iter().map(|(pattern, target)| RouteRule::new(pattern, target)));
        let router = Router::new(&routes)?;

        let mut uri = Uri::from_path(config.uri().clone(), &self.path)?;
        let rsegments = router.resolve(&mut uri, &Request::new())?;
        let route = Route::from_segments(&rsegments)
            .ok_or_else(|| format!("No route for '{}'", self.path))?;

        Ok(RouteResult {
            path: self.path,
            uri_string: uri.uri_string().to_string(),
            segments: uri.segment_array().to_vec(),
            rsegments,
            controller_class: route.controller_class(),
            action_method: route.action_method(),
            named: uri.ruri_to_assoc(3, &[]),
            controller: route.controller,
            action: route.action,
            params: route.params,
        })
    }
}
