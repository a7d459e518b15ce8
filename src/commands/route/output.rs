//! Output formatting for route command results.

use super::execute::RouteResult;
use crate::output::Outputable;

impl Outputable for RouteResult {
    fn to_table(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Route: {}", self.path));
        lines.push(String::new());
        lines.push(format!("  uri:        {}", display_or_empty(&self.uri_string)));
        lines.push(format!("  routed:     {}", self.rsegments.join("/")));
        lines.push(format!(
            "  controller: {} ({})",
            self.controller, self.controller_class
        ));
        lines.push(format!("  action:     {} ({})", self.action, self.action_method));

        if !self.params.is_empty() {
            lines.push(format!("  params:     {}", self.params.join(", ")));
        }

        if !self.named.is_empty() {
            lines.push(String::new());
            lines.push(format!("Named params ({}):", self.named.len()));
            for (key, value) in &self.named {
                match value {
                    Some(v) => lines.push(format!("  {} = {}", key, v)),
                    None => lines.push(format!("  {} (no value)", key)),
                }
            }
        }

        lines.join("\n")
    }
}

fn display_or_empty(s: &str) -> &str {
    if s.is_empty() { "(empty)" } else { s }
}
