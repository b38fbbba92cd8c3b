use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use jot_core::config::ClientConfig;
use jot_core::db::LibSqlItemStore;
use jot_core::remote::HttpRemoteClient;
use jot_core::services::ItemService;
use jot_core::sync::{RunOutcome, RunReport, SyncCoordinator};
use jot_core::Item;
use serde::Serialize;

use crate::error::CliError;

pub type Service = ItemService<LibSqlItemStore, HttpRemoteClient>;

const SHORT_KEY_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct ItemListEntry {
    pub local_key: String,
    pub remote_key: Option<String>,
    pub preview: String,
    pub text: String,
    pub updated_at: i64,
    pub relative_time: String,
    pub synced: bool,
}

/// Environment configuration with command-line overrides applied
pub fn resolve_config(
    db_path: Option<PathBuf>,
    api_url: Option<&str>,
    offline: bool,
) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(path) = db_path {
        config = config.with_db_path(path);
    }
    if let Some(url) = api_url {
        config = config.with_api_url(url)?;
    }
    if offline {
        config = config.offline();
    }
    Ok(config)
}

pub async fn open_service(config: &ClientConfig) -> Result<Service, CliError> {
    let store = Arc::new(LibSqlItemStore::open(&config.db_path).await?);

    let Some(api_url) = config.api_url.as_deref() else {
        tracing::debug!("No API URL configured, running local-only");
        return Ok(ItemService::local_only(store));
    };

    let remote = Arc::new(HttpRemoteClient::new(api_url, config.request_timeout)?);
    tracing::debug!(api_url, "Sync enabled");
    Ok(ItemService::new(SyncCoordinator::new(store, remote)))
}

pub fn resolve_item_text(parts: &[String]) -> Result<String, CliError> {
    if let Some(text) = normalize_text(&parts.join(" ")) {
        return Ok(text);
    }
    if let Some(text) = read_piped_stdin()? {
        return Ok(text);
    }
    Err(CliError::EmptyText)
}

pub fn normalize_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_item_key(key: &str) -> Result<String, CliError> {
    normalize_text(key).ok_or(CliError::EmptyKey)
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_text(&buffer))
}

pub fn short_key(item: &Item) -> String {
    item.local_key.as_str().chars().take(SHORT_KEY_LEN).collect()
}

pub fn format_item_lines(items: &[Item], now_ms: i64) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let marker = if item.is_known_to_remote() { ' ' } else { '*' };
            let preview = item.preview(40);
            let relative_time = format_relative_time(item.updated_at, now_ms);
            format!(
                "{marker} {short_key:<13}  {preview:<40}  {relative_time}",
                short_key = short_key(item)
            )
        })
        .collect()
}

pub fn item_to_list_entry(item: &Item, now_ms: i64) -> ItemListEntry {
    ItemListEntry {
        local_key: item.local_key.to_string(),
        remote_key: item.remote_key.as_ref().map(ToString::to_string),
        preview: item.preview(80),
        text: item.text.clone(),
        updated_at: item.updated_at,
        relative_time: format_relative_time(item.updated_at, now_ms),
        synced: item.is_known_to_remote(),
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// One-line summary of a run
pub fn describe_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed(report) => describe_report(report),
        RunOutcome::Aborted { reason, .. } => format!("Sync skipped: {reason}"),
    }
}

fn describe_report(report: &RunReport) -> String {
    let parts = [
        (report.created, "pushed"),
        (report.updated, "updated"),
        (report.deleted, "deleted"),
        (report.pulled, "pulled"),
        (report.refreshed, "refreshed"),
        (report.purged, "discarded"),
        (report.skipped + report.failed, "pending"),
    ]
    .into_iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, label)| format!("{count} {label}"))
    .collect::<Vec<_>>();

    if parts.is_empty() {
        "Up to date".to_string()
    } else {
        format!("Synced: {}", parts.join(", "))
    }
}

/// Tell the user when a sync after a mutation did not fully land
pub fn report_sync_notice(outcome: Option<&RunOutcome>) {
    match outcome {
        Some(outcome @ RunOutcome::Aborted { .. }) => eprintln!("{}", describe_outcome(outcome)),
        Some(RunOutcome::Completed(report)) if !report.is_clean() => {
            eprintln!(
                "Sync incomplete: {} change(s) will be retried",
                report.skipped + report.failed
            );
        }
        _ => {}
    }
}
