//! URI rewriting.
//!
//! Rules are tried in order after an exact-match lookup. `(:any)` and
//! `(:num)` expand to `(.+)` and `([0-9]+)`; `$1`-style backreferences in
//! the target take the captured text. Without a match the URI segments
//! are used as-is, and an empty URI routes to the default controller.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{RoutesConfig, UriConfig};

use super::request::Request;
use super::uri::{RouteError, Uri};

/// One rewrite rule, e.g. `product/(:num)` -> `catalog/show/$1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
    pub pattern: String,
    pub target: String,
}

impl RouteRule {
    pub fn new(pattern: &str, target: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            target: target.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: RouteRule,
    regex: Regex,
    /// `target` with `$N` braced for `Regex::replace`.
    replacement: String,
}

#[derive(Debug, Clone)]
pub struct Router {
    default_controller: String,
    override_404: String,
    rules: Vec<CompiledRule>,
}

fn expand_wildcards(pattern: &str) -> String {
    pattern.replace(":any", ".+").replace(":num", "[0-9]+")
}

/// `$1_edit` must read as group 1 followed by `_edit`, not as a group
/// named `1_edit`.
fn brace_backreferences(target: &str) -> String {
    let mut out = String::with_capacity(target.len() + 4);
    let mut chars = target.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' || !chars.peek().is_some_and(char::is_ascii_digit) {
            out.push(c);
            continue;
        }
        out.push_str("${");
        while let Some(d) = chars.next_if(char::is_ascii_digit) {
            out.push(d);
        }
        out.push('}');
    }
    out
}

fn split_route(route: &str) -> Vec<String> {
    route
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Router {
    pub fn new(config: &RoutesConfig) -> Result<Self, RouteError> {
        let rules = config
            .rules
            .iter()
            .map(|rule| {
                let pattern = format!("^{}$", expand_wildcards(&rule.pattern));
                Regex::new(&pattern)
                    .map(|regex| CompiledRule {
                        rule: rule.clone(),
                        regex,
                        replacement: brace_backreferences(&rule.target),
                    })
                    .map_err(|e| RouteError::InvalidRule {
                        pattern: rule.pattern.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            default_controller: config.default_controller.trim_matches('/').to_string(),
            override_404: config.override_404.trim_matches('/').to_string(),
            rules,
        })
    }

    pub fn default_controller(&self) -> &str {
        &self.default_controller
    }

    /// The configured 404 override route, if any.
    pub fn override_404(&self) -> Option<&str> {
        Some(self.override_404.as_str()).filter(|s| !s.is_empty())
    }

    /// Compute the re-routed segments for `uri` and store them on it.
    ///
    /// With query strings enabled and the controller trigger present, the
    /// triggers decide the route and the rules are skipped.
    pub fn resolve(&self, uri: &mut Uri, request: &Request) -> Result<Vec<String>, RouteError> {
        let rsegments = match query_string_route(uri.config(), request) {
            Some(segments) => segments,
            None if uri.segment_array().is_empty() => self.default_segments()?,
            None => self.parse_routes(uri.segment_array()),
        };
        let rsegments = if rsegments.is_empty() {
            self.default_segments()?
        } else {
            rsegments
        };
        debug!(category = "uri", uri = %uri.uri_string(), route = %rsegments.join("/"), "route resolved");
        uri.set_rsegments(rsegments.clone());
        Ok(rsegments)
    }

    fn default_segments(&self) -> Result<Vec<String>, RouteError> {
        if self.default_controller.is_empty() {
            return Err(RouteError::NoDefaultController);
        }
        Ok(split_route(&self.default_controller))
    }

    /// Apply the rewrite rules to `segments`.
    pub fn parse_routes(&self, segments: &[String]) -> Vec<String> {
        let uri = segments.join("/");

        if let Some(exact) = self.rules.iter().find(|c| c.rule.pattern == uri) {
            return split_route(&exact.rule.target);
        }

        for compiled in &self.rules {
            if !compiled.regex.is_match(&uri) {
                continue;
            }
            let target = &compiled.rule.target;
            if target.contains('$') && compiled.rule.pattern.contains('(') {
                let rewritten = compiled.regex.replace(&uri, compiled.replacement.as_str());
                return split_route(&rewritten);
            }
            return split_route(target);
        }

        segments.to_vec()
    }
}

fn query_string_route(config: &UriConfig, request: &Request) -> Option<Vec<String>> {
    if !config.enable_query_strings {
        return None;
    }
    let controller = request
        .get(&config.controller_trigger)
        .map(str::trim)
        .filter(|c| !c.is_empty())?;

    let mut segments = Vec::new();
    if let Some(module) = request.get(&config.module_trigger).map(str::trim).filter(|m| !m.is_empty()) {
        segments.push(module.to_string());
    }
    segments.push(controller.to_string());
    if let Some(action) = request.get(&config.function_trigger).map(str::trim).filter(|a| !a.is_empty()) {
        segments.push(action.to_string());
    }
    Some(segments)
}
