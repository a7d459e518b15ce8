use std::error::Error;

use serde::Serialize;

use super::DsnCmd;
use crate::commands::{CommandContext, Execute};
use crate::db::config::ConnectionParams;
use crate::db::driver::DriverKind;

const MASK: &str = "********";

/// Result of the dsn command execution
#[derive(Debug, Serialize)]
pub struct DsnResult {
    pub dsn: String,
    /// Whether a driver is registered under `dbdriver`
    pub supported: bool,
    pub params: ConnectionParams,
}

impl Execute for DsnCmd {
    type Output = DsnResult;

    fn execute(self, _ctx: &CommandContext) -> Result<Self::Output, Box<dyn Error>> {
        let mut params = ConnectionParams::from_dsn(&self.dsn)?;
        if !self.show_password && !params.password.is_empty() {
            params.password = MASK.to_string();
        }
        Ok(DsnResult {
            supported: DriverKind::from_name(&params.dbdriver).is_ok(),
            dsn: self.dsn,
            params,
        })
    }
}
