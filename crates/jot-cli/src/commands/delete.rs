use jot_core::config::ClientConfig;

use crate::commands::common::{normalize_item_key, open_service, report_sync_notice};
use crate::error::CliError;

pub async fn run_delete(key: &str, config: &ClientConfig) -> Result<(), CliError> {
    let query = normalize_item_key(key)?;
    let service = open_service(config).await?;
    let item = service.find_by_prefix(&query).await?;

    let (deleted, outcome) = service.delete(&item.local_key).await?.synced().await;
    println!("{}", deleted.local_key);
    report_sync_notice(outcome.as_ref());
    Ok(())
}
