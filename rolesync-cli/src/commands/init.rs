//! `rolesync init [--tenant-id ID] [--client-id ID] [--graph-endpoint URL]`

use anyhow::{Context, Result};
use clap::Args;

use rolesync_core::config;

/// Write `~/.rolesync/config.yaml`, keeping any existing aliases.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory (tenant) id used for the client-credentials grant.
    #[arg(long)]
    pub tenant_id: Option<String>,

    /// Application (client) id used for the client-credentials grant.
    #[arg(long)]
    pub client_id: Option<String>,

    /// Microsoft Graph base URL, e.g. a national cloud endpoint.
    #[arg(long, value_name = "URL")]
    pub graph_endpoint: Option<String>,

    /// Assignments requested per page (1-999).
    #[arg(long)]
    pub page_size: Option<u32>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let mut settings = config::load().context("failed to read the existing config")?;
        if let Some(tenant) = self.tenant_id {
            settings.tenant_id = Some(tenant);
        }
        if let Some(client) = self.client_id {
            settings.client_id = Some(client);
        }
        if let Some(endpoint) = self.graph_endpoint {
            settings.graph_endpoint = endpoint;
        }
        if let Some(page_size) = self.page_size {
            settings.page_size = page_size;
        }
        settings.validate().context("refusing to write an invalid config")?;

        let path = config::save(&settings).context("failed to write config")?;
        println!("✓ Wrote {}", path.display());
        if settings.tenant_id.is_none() || settings.client_id.is_none() {
            println!("  No client credentials configured; set ROLESYNC_ACCESS_TOKEN to run.");
        } else {
            println!("  Set ROLESYNC_CLIENT_SECRET before running add, remove or sync.");
        }
        Ok(())
    }
}
