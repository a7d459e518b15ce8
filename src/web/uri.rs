//! URI detection and segment access.
//!
//! A `Uri` is built once per request: the raw string is pulled from the
//! request according to `UriProtocol`, cleaned, stripped of the URL suffix
//! and split into segments. The router later fills in the re-routed
//! segments (`rsegments`). Segment numbers are 1-based throughout.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::UriConfig;

use super::request::Request;

/// Name/value pairs read from segments, in segment order.
pub type Assoc = IndexMap<String, Option<String>>;

/// Routing error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("The URI you submitted has disallowed characters: {0}")]
    DisallowedCharacters(String),

    #[error("Invalid permitted URI characters pattern: {0}")]
    InvalidWhitelist(String),

    #[error("Invalid route pattern '{pattern}': {message}")]
    InvalidRule { pattern: String, message: String },

    #[error("Unable to determine what should be displayed. A default route has not been specified in the routing file.")]
    NoDefaultController,
}

impl RouteError {
    /// Stable key for localized error messages.
    pub fn message_key(&self) -> &'static str {
        match self {
            RouteError::DisallowedCharacters(_) => "uri_disallowed_chars",
            RouteError::InvalidWhitelist(_) => "uri_invalid_whitelist",
            RouteError::InvalidRule { .. } => "route_invalid_rule",
            RouteError::NoDefaultController => "route_no_default_controller",
        }
    }
}

/// Where the URI string is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UriProtocol {
    /// Try REQUEST_URI, PATH_INFO, QUERY_STRING, a lone GET key, then argv.
    #[default]
    Auto,
    RequestUri,
    PathInfo,
    OrigPathInfo,
    QueryString,
    Cli,
}

impl UriProtocol {
    fn server_key(self) -> Option<&'static str> {
        match self {
            UriProtocol::PathInfo => Some("PATH_INFO"),
            UriProtocol::OrigPathInfo => Some("ORIG_PATH_INFO"),
            UriProtocol::QueryString => Some("QUERY_STRING"),
            _ => None,
        }
    }
}

/// Which side(s) `slash_segment` adds a slash to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlashSide {
    #[default]
    Trailing,
    Leading,
    Both,
}

#[derive(Debug, Clone)]
pub struct Uri {
    config: UriConfig,
    whitelist: Option<Regex>,
    uri_string: String,
    segments: Vec<String>,
    rsegments: Vec<String>,
}

fn compile_whitelist(config: &UriConfig) -> Result<Option<Regex>, RouteError> {
    if config.permitted_uri_chars.is_empty() || config.enable_query_strings {
        return Ok(None);
    }
    let pattern = format!("(?i)^[{}]+$", config.permitted_uri_chars);
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| RouteError::InvalidWhitelist(e.to_string()))
}

/// Drop control characters, raw or percent-encoded (`%00`-`%1f`, `%7f`).
fn remove_invisible_characters(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                let code = hi * 16 + lo;
                if code < 0x20 || code == 0x7f {
                    i += 3;
                    continue;
                }
            }
        }
        if b < 0x20 || b == 0x7f {
            i += 1;
            continue;
        }
        out.push(b);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Normalize a raw URI string: control characters out, `//` and `../`
/// collapsed, slashes trimmed. A lone `/` becomes empty.
pub fn clean_uri_string(raw: &str) -> String {
    let mut s = remove_invisible_characters(raw);
    while s.contains("//") || s.contains("../") {
        s = s.replace("//", "/").replace("../", "/");
    }
    s.trim_matches('/').to_string()
}

impl Uri {
    /// An empty URI; `set_uri_string` or `detect` fills it.
    pub fn new(config: UriConfig) -> Result<Self, RouteError> {
        let whitelist = compile_whitelist(&config)?;
        Ok(Self {
            config,
            whitelist,
            uri_string: String::new(),
            segments: Vec::new(),
            rsegments: Vec::new(),
        })
    }

    /// Detect the URI of `request` and split it into segments.
    pub fn detect(config: UriConfig, request: &Request) -> Result<Self, RouteError> {
        let mut uri = Self::new(config)?;
        let raw = uri.fetch_uri_string(request);
        uri.set_uri_string(&raw)?;
        Ok(uri)
    }

    /// Build directly from a path such as `user/add/id/5`.
    pub fn from_path(config: UriConfig, path: &str) -> Result<Self, RouteError> {
        let mut uri = Self::new(config)?;
        uri.set_uri_string(path)?;
        Ok(uri)
    }

    pub fn config(&self) -> &UriConfig {
        &self.config
    }

    fn fetch_uri_string(&self, request: &Request) -> String {
        match self.config.uri_protocol {
            UriProtocol::Auto => self.detect_auto(request),
            UriProtocol::RequestUri => detect_request_uri(request).unwrap_or_default(),
            UriProtocol::Cli => parse_cli_args(request),
            protocol => protocol
                .server_key()
                .and_then(|key| request.server(key))
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn detect_auto(&self, request: &Request) -> String {
        if let Some(uri) = detect_request_uri(request) {
            debug!(category = "uri", uri = %uri, "uri detected from REQUEST_URI");
            return uri;
        }

        let path = request
            .server("PATH_INFO")
            .or_else(|| request.server("ORIG_PATH_INFO"))
            .unwrap_or_default();
        let self_path = request
            .server("PHP_SELF")
            .map(|s| format!("/{}", s.trim_start_matches('/')));
        if !path.trim_matches('/').is_empty() && self_path.as_deref() != Some(path) {
            debug!(category = "uri", uri = %path, "uri detected from PATH_INFO");
            return path.to_string();
        }

        if let Some(query) = request.server("QUERY_STRING") {
            if !query.trim_matches('/').is_empty() {
                debug!(category = "uri", uri = %query, "uri detected from QUERY_STRING");
                return query.to_string();
            }
        }

        let get = request.get_params();
        if get.len() == 1 {
            if let Some(key) = get.keys().next() {
                if !key.trim_matches('/').is_empty() {
                    debug!(category = "uri", uri = %key, "uri detected from lone GET key");
                    return key.clone();
                }
            }
        }

        if request.is_cli() {
            return parse_cli_args(request);
        }

        String::new()
    }

    /// Replace the URI string and re-split the segments.
    ///
    /// The URL suffix is removed before splitting; every segment is checked
    /// against the whitelist.
    pub fn set_uri_string(&mut self, raw: &str) -> Result<(), RouteError> {
        self.uri_string = clean_uri_string(raw);
        self.remove_url_suffix();
        self.explode_segments()
    }

    fn remove_url_suffix(&mut self) {
        let suffix = &self.config.url_suffix;
        if !suffix.is_empty() {
            if let Some(stripped) = self.uri_string.strip_suffix(suffix.as_str()) {
                self.uri_string = stripped.to_string();
            }
        }
    }

    fn explode_segments(&mut self) -> Result<(), RouteError> {
        let mut segments = Vec::new();
        for raw in self.uri_string.trim_matches('/').split('/') {
            let val = self.filter_uri(raw)?;
            let val = val.trim();
            if !val.is_empty() {
                segments.push(val.to_string());
            }
        }
        self.segments = segments;
        Ok(())
    }

    /// Check a segment against the whitelist and entity-encode `$ ( )`.
    pub fn filter_uri(&self, segment: &str) -> Result<String, RouteError> {
        if let Some(whitelist) = &self.whitelist {
            if !segment.is_empty() && !whitelist.is_match(segment) {
                warn!(category = "uri", segment = %segment, "uri segment rejected by whitelist");
                return Err(RouteError::DisallowedCharacters(segment.to_string()));
            }
        }
        Ok(segment
            .replace('$', "&#36;")
            .replace('(', "&#40;")
            .replace(')', "&#41;")
            .replace("%28", "&#40;")
            .replace("%29", "&#41;"))
    }

    /// Install the segments produced by routing.
    pub fn set_rsegments(&mut self, rsegments: Vec<String>) {
        self.rsegments = rsegments;
    }

    pub fn uri_string(&self) -> &str {
        &self.uri_string
    }

    /// The re-routed segments joined with `/`.
    pub fn ruri_string(&self) -> String {
        self.rsegments.join("/")
    }

    pub fn segment(&self, n: usize) -> Option<&str> {
        nth(&self.segments, n)
    }

    pub fn segment_or<'a>(&'a self, n: usize, default: &'a str) -> &'a str {
        self.segment(n).unwrap_or(default)
    }

    pub fn rsegment(&self, n: usize) -> Option<&str> {
        nth(&self.rsegments, n)
    }

    pub fn rsegment_or<'a>(&'a self, n: usize, default: &'a str) -> &'a str {
        self.rsegment(n).unwrap_or(default)
    }

    pub fn segment_array(&self) -> &[String] {
        &self.segments
    }

    pub fn rsegment_array(&self) -> &[String] {
        &self.rsegments
    }

    pub fn total_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn total_rsegments(&self) -> usize {
        self.rsegments.len()
    }

    /// Pair segments from `n` on into a key/value map.
    ///
    /// A trailing key without a value maps to `None`, as does every name in
    /// `defaults` that is missing.
    pub fn uri_to_assoc(&self, n: usize, defaults: &[&str]) -> Assoc {
        to_assoc(&self.segments, n, defaults)
    }

    pub fn ruri_to_assoc(&self, n: usize, defaults: &[&str]) -> Assoc {
        to_assoc(&self.rsegments, n, defaults)
    }

    /// The inverse of `uri_to_assoc`: `k1/v1/k2/v2`.
    pub fn assoc_to_uri<I, K, V>(pairs: I) -> String
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        pairs
            .into_iter()
            .flat_map(|(k, v)| [k.as_ref().to_string(), v.as_ref().to_string()])
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn slash_segment(&self, n: usize, side: SlashSide) -> String {
        slash(self.segment(n).unwrap_or_default(), side)
    }

    pub fn slash_rsegment(&self, n: usize, side: SlashSide) -> String {
        slash(self.rsegment(n).unwrap_or_default(), side)
    }
}

fn nth(segments: &[String], n: usize) -> Option<&str> {
    n.checked_sub(1)
        .and_then(|i| segments.get(i))
        .map(String::as_str)
}

fn to_assoc(segments: &[String], n: usize, defaults: &[&str]) -> Assoc {
    let mut map = Assoc::new();
    if n >= 1 && segments.len() >= n {
        for pair in segments[n - 1..].chunks(2) {
            map.insert(pair[0].clone(), pair.get(1).cloned());
        }
    }
    for key in defaults {
        map.entry((*key).to_string()).or_insert(None);
    }
    map
}

fn slash(segment: &str, side: SlashSide) -> String {
    match side {
        SlashSide::Trailing => format!("{}/", segment),
        SlashSide::Leading => format!("/{}", segment),
        SlashSide::Both => format!("/{}/", segment),
    }
}

/// The path part of REQUEST_URI relative to the front script.
///
/// Returns `None` when REQUEST_URI or SCRIPT_NAME is missing and `/` for
/// the site root.
fn detect_request_uri(request: &Request) -> Option<String> {
    let request_uri = request.server("REQUEST_URI")?;
    let script_name = request.server("SCRIPT_NAME")?;

    let mut uri = request_uri;
    if let Some(rest) = uri.strip_prefix(script_name) {
        uri = rest;
    } else {
        let dir = script_name
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or_default();
        if !dir.is_empty() {
            if let Some(rest) = uri.strip_prefix(dir) {
                uri = rest;
            }
        }
    }

    // servers that force the path into the query string
    let uri = uri.strip_prefix("?/").unwrap_or(uri);
    let path = uri.split_once('?').map_or(uri, |(path, _)| path);

    if path.is_empty() || path == "/" {
        return Some("/".to_string());
    }
    Some(clean_uri_string(path))
}

fn parse_cli_args(request: &Request) -> String {
    format!("/{}", request.argv().join("/"))
}
