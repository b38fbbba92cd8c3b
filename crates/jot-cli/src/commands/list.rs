use jot_core::config::ClientConfig;
use jot_core::Item;

use crate::commands::common::{
    format_item_lines, item_to_list_entry, now_ms, open_service, ItemListEntry, Service,
};
use crate::error::CliError;

pub async fn run_list(limit: usize, json: bool, config: &ClientConfig) -> Result<(), CliError> {
    let service = open_service(config).await?;
    let items = list_items(&service, limit).await?;

    if json {
        let now = now_ms();
        let entries = items
            .iter()
            .map(|item| item_to_list_entry(item, now))
            .collect::<Vec<ItemListEntry>>();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No items yet. Capture one with: jot \"your thought\"");
        return Ok(());
    }

    for line in format_item_lines(&items, now_ms()) {
        println!("{line}");
    }
    Ok(())
}

/// Newest first, at most `limit`
pub async fn list_items(service: &Service, limit: usize) -> Result<Vec<Item>, CliError> {
    let mut items = service.visible_items().await?;
    items.truncate(limit);
    Ok(items)
}
