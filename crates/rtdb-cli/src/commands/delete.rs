//! Delete command

use anyhow::{Context, Result};
use rtdb_client::RtdbClient;

use crate::output::OutputContext;

pub async fn delete(client: &RtdbClient, path: &str, ctx: &OutputContext) -> Result<()> {
    client
        .delete(path)
        .await
        .with_context(|| format!("Failed to delete {}", path))?;

    ctx.success(&format!("Deleted {}", path));
    Ok(())
}
