//! URL creation.

use serde::{Deserialize, Serialize};
use url::form_urlencoded::byte_serialize;

use crate::config::UriConfig;

/// How `create_url` encodes the route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlFormat {
    /// `base/controller/action/k1/v1[.suffix]`
    #[default]
    Path,
    /// `base?c=controller&a=action&k1=v1`
    Get,
}

fn encode(s: &str) -> String {
    byte_serialize(s.as_bytes()).collect()
}

#[derive(Debug, Clone)]
pub struct UrlManager {
    config: UriConfig,
}

impl UrlManager {
    pub fn new(config: UriConfig) -> Self {
        Self { config }
    }

    pub fn format(&self) -> UrlFormat {
        self.config.url_format
    }

    fn base(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if self.config.show_script_name && !self.config.script_name.is_empty() {
            format!("{}/{}", base, self.config.script_name.trim_matches('/'))
        } else {
            base.to_string()
        }
    }

    /// Build a URL for `route` (`[module/]controller/action`) with `params`
    /// appended as encoded name/value pairs.
    pub fn create_url(&self, route: &str, params: &[(&str, &str)], anchor: Option<&str>) -> String {
        let route = route.trim_matches('/');
        let mut url = match self.config.url_format {
            UrlFormat::Path => self.path_url(route, params),
            UrlFormat::Get => self.get_url(route, params),
        };
        if let Some(anchor) = anchor.filter(|a| !a.is_empty()) {
            url.push('#');
            url.push_str(anchor);
        }
        url
    }

    fn path_url(&self, route: &str, params: &[(&str, &str)]) -> String {
        let mut path: Vec<String> = route
            .split('/')
            .filter(|s| !s.is_empty())
            .map(encode)
            .collect();
        for (k, v) in params {
            path.push(encode(k));
            path.push(encode(v));
        }
        if path.is_empty() {
            return format!("{}/", self.base());
        }
        format!("{}/{}{}", self.base(), path.join("/"), self.config.url_suffix)
    }

    fn get_url(&self, route: &str, params: &[(&str, &str)]) -> String {
        let parts: Vec<&str> = route.split('/').filter(|s| !s.is_empty()).collect();
        let (module, controller, action) = match parts.as_slice() {
            [] => (None, None, None),
            [c] => (None, Some(*c), None),
            [c, a] => (None, Some(*c), Some(*a)),
            [m, c, a, ..] => (Some(*m), Some(*c), Some(*a)),
        };

        let mut pairs: Vec<String> = Vec::new();
        let triggers = [
            (&self.config.module_trigger, module),
            (&self.config.controller_trigger, controller),
            (&self.config.function_trigger, action),
        ];
        for (key, value) in triggers {
            if let Some(value) = value {
                pairs.push(format!("{}={}", encode(key), encode(value)));
            }
        }
        for (k, v) in params {
            pairs.push(format!("{}={}", encode(k), encode(v)));
        }

        if pairs.is_empty() {
            return format!("{}/", self.base());
        }
        format!("{}?{}", self.base(), pairs.join("&"))
    }
}
