//! Output formatting for dispatch command results.

use super::execute::DispatchResult;
use crate::output::Outputable;

impl Outputable for DispatchResult {
    fn to_table(&self) -> String {
        let mut lines = vec![format!("{} -> {}", self.path, self.status)];
        for (name, value) in &self.headers {
            lines.push(format!("{}: {}", name, value));
        }
        lines.push(String::new());
        lines.push(self.body.clone());
        lines.join("\n")
    }
}
