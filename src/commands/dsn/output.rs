//! Output formatting for dsn command results.

use super::execute::DsnResult;
use crate::output::Outputable;

impl Outputable for DsnResult {
    fn to_table(&self) -> String {
        let p = &self.params;
        let mut lines = vec![format!("DSN: {}", self.dsn), String::new()];

        let driver = if self.supported {
            p.dbdriver.clone()
        } else {
            format!("{} (unsupported)", p.dbdriver)
        };
        lines.push(format!("  driver:        {}", driver));
        if !p.hostname.is_empty() {
            lines.push(format!("  hostname:      {}", p.hostname));
        }
        if let Some(port) = p.port {
            lines.push(format!("  port:          {}", port));
        }
        if !p.username.is_empty() {
            lines.push(format!("  username:      {}", p.username));
        }
        if !p.password.is_empty() {
            lines.push(format!("  password:      {}", p.password));
        }
        lines.push(format!("  database:      {}", p.database));
        if !p.dbprefix.is_empty() {
            lines.push(format!("  dbprefix:      {}", p.dbprefix));
        }
        lines.push(format!("  pconnect:      {}", p.pconnect));
        lines.push(format!("  active_record: {}", p.active_record));
        lines.push(format!("  cache_on:      {}", p.cache_on));
        if let Some(dir) = &p.cachedir {
            lines.push(format!("  cachedir:      {}", dir.display()));
        }
        for (key, value) in &p.extra {
            lines.push(format!("  {:<14} {}", format!("{}:", key), value));
        }

        lines.join("\n")
    }
}
