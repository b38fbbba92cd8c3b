use std::io::{self, IsTerminal, Write};

use jot_core::config::ClientConfig;
use jot_core::sync::{spawn_change_listener, spawn_periodic, RunOutcome};
use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::{describe_outcome, format_item_lines, now_ms, open_service, Service};
use crate::commands::list::list_items;
use crate::error::CliError;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Live list: refreshed after every sync run until Ctrl-C.
pub async fn run_watch(limit: usize, config: &ClientConfig) -> Result<(), CliError> {
    let service = open_service(config).await?;
    let coordinator = service
        .coordinator()
        .cloned()
        .ok_or(CliError::SyncNotConfigured)?;
    let mut events = coordinator.subscribe();

    render(&service, limit, None).await?;

    let listener = spawn_change_listener(coordinator.clone(), config.stream_retry);
    let periodic = config
        .sync_interval
        .map(|period| spawn_periodic(coordinator.clone(), period));
    coordinator.request_detached();

    let result = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let Err(error) = render(&service, limit, Some(&event.outcome)).await {
                        break Err(error);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Watch fell behind sync events");
                    if let Err(error) = render(&service, limit, None).await {
                        break Err(error);
                    }
                }
                Err(RecvError::Closed) => break Ok(()),
            },
            signal = tokio::signal::ctrl_c() => break signal.map_err(CliError::from),
        }
    };

    listener.abort();
    if let Some(periodic) = periodic {
        periodic.abort();
    }
    result
}

async fn render(
    service: &Service,
    limit: usize,
    outcome: Option<&RunOutcome>,
) -> Result<(), CliError> {
    let items = list_items(service, limit).await?;
    let mut stdout = io::stdout().lock();

    if stdout.is_terminal() {
        write!(stdout, "{CLEAR_SCREEN}")?;
    }
    if items.is_empty() {
        writeln!(stdout, "No items yet.")?;
    }
    for line in format_item_lines(&items, now_ms()) {
        writeln!(stdout, "{line}")?;
    }
    if let Some(outcome) = outcome {
        writeln!(stdout)?;
        writeln!(stdout, "{}", describe_outcome(outcome))?;
    }
    stdout.flush()?;
    Ok(())
}
