//! Response buffer and the output sink it is displayed through.

use serde::Serialize;

/// Everything an action produced: status, headers and body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: String::new(),
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, text: &str) {
        self.body.push_str(text);
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Set a header, replacing any earlier value with the same name.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Final destination of a response.
pub trait Output {
    fn display(&mut self, response: &Response);
}

/// Keeps displayed responses in memory.
#[derive(Debug, Default)]
pub struct BufferedOutput {
    pub displayed: Vec<Response>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&Response> {
        self.displayed.last()
    }
}

impl Output for BufferedOutput {
    fn display(&mut self, response: &Response) {
        self.displayed.push(response.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_replace_case_insensitively() {
        let mut response = Response::new();
        response.set_header("Content-Type", "text/html");
        response.set_header("content-type", "application/json");
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn test_buffered_output_keeps_responses() {
        let mut response = Response::new();
        response.append("hello");
        let mut output = BufferedOutput::new();
        output.display(&response);
        assert_eq!(output.last().map(|r| r.body.as_str()), Some("hello"));
        assert_eq!(output.last().map(|r| r.status), Some(200));
    }
}
