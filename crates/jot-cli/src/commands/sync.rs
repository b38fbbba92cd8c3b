use jot_core::config::ClientConfig;
use jot_core::sync::RunOutcome;

use crate::commands::common::{describe_outcome, open_service};
use crate::error::CliError;

pub async fn run_sync(config: &ClientConfig) -> Result<(), CliError> {
    if config.api_url.is_none() {
        return Err(CliError::SyncNotConfigured);
    }

    let service = open_service(config).await?;
    let outcome = service.sync_now().await.ok_or(CliError::SyncNotConfigured)?;
    match &outcome {
        RunOutcome::Completed(report) => {
            println!("{}", describe_outcome(&outcome));
            if !report.is_clean() {
                eprintln!(
                    "{} change(s) could not be applied and will be retried",
                    report.skipped + report.failed
                );
            }
        }
        RunOutcome::Aborted { .. } => eprintln!("{}", describe_outcome(&outcome)),
    }
    Ok(())
}
