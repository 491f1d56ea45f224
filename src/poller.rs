use std::future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::api::{ApiError, Run};
use crate::pr::PrReference;
use crate::resolver::RunLookup;

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Polling was cancelled")]
    Cancelled,
}

/// How long to wait for a terminal run and how often to look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            interval: Duration::from_secs(3),
        }
    }
}

/// Look up the latest run until it is COMPLETED or FAILED.
///
/// Returns `Ok(None)` once `options.timeout` has elapsed without a terminal
/// run. A FAILED run is returned as `Ok(Some(run))`: the poll succeeded even
/// though the analysis did not. Lookup errors abort polling immediately.
///
/// The deadline and the cancellation token are checked before every lookup,
/// so a zero timeout never touches the backend. A timeout too large to
/// represent as an instant means there is no deadline.
#[instrument(skip(lookup, cancel), fields(pr = %reference))]
pub async fn poll_for_completed_run(
    lookup: &dyn RunLookup,
    reference: &PrReference,
    options: PollOptions,
    cancel: &CancellationToken,
) -> Result<Option<Run>, PollError> {
    let deadline = Instant::now().checked_add(options.timeout);
    if deadline.is_none() {
        debug!(timeout_secs = options.timeout.as_secs(), "timeout out of range, polling without a deadline");
    }
    let expired = async {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => future::pending().await,
        }
    };

    let checks = async {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match lookup.latest_run(reference).await? {
                Some(run) if run.status.is_terminal() => {
                    info!(run_id = run.id, status = %run.status, attempt, "run reached terminal state");
                    return Ok::<_, ApiError>(run);
                }
                Some(run) => debug!(run_id = run.id, status = %run.status, attempt, "run not finished"),
                None => debug!(attempt, "no run yet"),
            }
            sleep(options.interval).await;
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PollError::Cancelled),
        _ = expired => {
            info!(timeout_ms = options.timeout.as_millis() as u64, "timed out waiting for a terminal run");
            Ok(None)
        }
        result = checks => Ok(Some(result?)),
    }
}
