//! Output formatting for url command results.

use super::execute::UrlResult;
use crate::output::Outputable;

impl Outputable for UrlResult {
    fn to_table(&self) -> String {
        self.url.clone()
    }
}
