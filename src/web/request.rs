//! Incoming request data.
//!
//! A plain value holding the server environment, GET/POST/COOKIE values
//! and, for command-line runs, the argument vector. The URI detector and
//! the dispatcher only read from it.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    server: BTreeMap<String, String>,
    get: BTreeMap<String, String>,
    post: BTreeMap<String, String>,
    cookie: BTreeMap<String, String>,
    argv: Vec<String>,
    cli: bool,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// A web request for `request_uri` served by `/index.php`.
    ///
    /// The query string, if any, also fills the GET values.
    pub fn web(request_uri: &str) -> Self {
        let mut request = Self::new()
            .with_server("REQUEST_URI", request_uri)
            .with_server("SCRIPT_NAME", "/index.php");
        if let Some((_, query)) = request_uri.split_once('?') {
            request = request.with_server("QUERY_STRING", query);
            for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
                request.get.insert(k.into_owned(), v.into_owned());
            }
        }
        request
    }

    /// A command-line request; `args` excludes the program name.
    pub fn cli<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: args.into_iter().map(Into::into).collect(),
            cli: true,
            ..Self::default()
        }
    }

    pub fn with_server(mut self, key: &str, value: &str) -> Self {
        self.server.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_get(mut self, key: &str, value: &str) -> Self {
        self.get.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_post(mut self, key: &str, value: &str) -> Self {
        self.post.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_cookie(mut self, key: &str, value: &str) -> Self {
        self.cookie.insert(key.to_string(), value.to_string());
        self
    }

    pub fn server(&self, key: &str) -> Option<&str> {
        self.server.get(key).map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.get.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn post(&self, key: &str) -> Option<&str> {
        self.post.get(key).map(String::as_str)
    }

    pub fn post_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.post(key).unwrap_or(default)
    }

    pub fn cookie(&self, key: &str) -> Option<&str> {
        self.cookie.get(key).map(String::as_str)
    }

    /// GET first, then POST.
    pub fn get_post(&self, key: &str) -> Option<&str> {
        self.get(key).or_else(|| self.post(key))
    }

    pub fn get_params(&self) -> &BTreeMap<String, String> {
        &self.get
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn is_cli(&self) -> bool {
        self.cli
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_request_parses_query() {
        let request = Request::web("/index.php/user/list?page=2&q=a+b");
        assert_eq!(request.server("REQUEST_URI"), Some("/index.php/user/list?page=2&q=a+b"));
        assert_eq!(request.server("QUERY_STRING"), Some("page=2&q=a+b"));
        assert_eq!(request.get("q"), Some("a b"));
        assert_eq!(request.get_or("missing", "x"), "x");
        assert!(!request.is_cli());
    }

    #[test]
    fn test_get_post_prefers_get() {
        let request = Request::new().with_get("id", "1").with_post("id", "2").with_post("name", "n");
        assert_eq!(request.get_post("id"), Some("1"));
        assert_eq!(request.get_post("name"), Some("n"));
        assert_eq!(request.post_or("x", "d"), "d");
    }

    #[test]
    fn test_cli_request() {
        let request = Request::cli(["user", "list"]).with_cookie("sid", "abc");
        assert!(request.is_cli());
        assert_eq!(request.argv(), ["user", "list"]);
        assert_eq!(request.cookie("sid"), Some("abc"));
    }
}
