use jot_core::config::ClientConfig;

use crate::commands::common::{open_service, report_sync_notice, resolve_item_text};
use crate::error::CliError;

pub async fn run_add(parts: &[String], config: &ClientConfig) -> Result<(), CliError> {
    let text = resolve_item_text(parts)?;
    let service = open_service(config).await?;

    let (item, outcome) = service.create(&text).await?.synced().await;
    tracing::debug!(key = %item.local_key, "Item captured");
    println!("{}", item.local_key);
    report_sync_notice(outcome.as_ref());
    Ok(())
}
