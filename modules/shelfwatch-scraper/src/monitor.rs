use std::time::Duration;

use apify_client::{ApifyError, RunStatus};
use tracing::debug;

use crate::error::Result;
use crate::registry::TaskRegistry;
use crate::traits::ScrapeProvider;

/// How a watched run ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RunOutcome {
    /// The provider reported success; results are ready to reconcile.
    Succeeded,
    /// The provider reported a failed, aborted or timed-out run.
    Failed(String),
    /// The task left the active set while we were waiting.
    Detached,
}

/// Poll a run until the provider reports a terminal status.
///
/// The first poll happens immediately, later ones every `interval`. Polls are
/// strictly sequential. There is no overall timeout: a run the provider never
/// finishes is polled forever. A poll error ends the watch and is returned.
pub(crate) async fn watch_run(
    provider: &dyn ScrapeProvider,
    tasks: &TaskRegistry,
    run_id: &str,
    interval: Duration,
) -> Result<RunOutcome> {
    loop {
        let snapshot = provider.run_status(run_id).await?;

        if snapshot.status == RunStatus::Succeeded {
            // Stays Processing until reconciliation settles it.
            tasks.record_progress(run_id, 100);
            return Ok(RunOutcome::Succeeded);
        }
        if snapshot.status.is_failure() {
            let message = snapshot.message.unwrap_or_else(|| {
                ApifyError::RunFailed(snapshot.status.to_string()).to_string()
            });
            return Ok(RunOutcome::Failed(message));
        }

        if !tasks.record_progress(run_id, snapshot.progress) {
            return Ok(RunOutcome::Detached);
        }
        debug!(
            run_id,
            status = %snapshot.status,
            progress = snapshot.progress,
            "Run still in progress"
        );

        tokio::time::sleep(interval).await;
    }
}
