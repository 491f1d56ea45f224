use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use std::cmp::Reverse;
use tracing::{debug, instrument};

use crate::api::{ApiError, Backend, Run};
use crate::pr::PrReference;

/// Outcome of mapping a PR reference onto the backend's records.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// No repository named `owner/repo` (case-insensitive)
    RepoNotFound,
    /// The repository exists but has no PR with that number
    PrNotFound,
    /// The PR exists but has no runs yet
    NoRuns { pull_request_id: i64 },
    /// Latest run for the PR
    Found { pull_request_id: i64, run: Run },
}

impl Resolution {
    pub fn into_run(self) -> Option<Run> {
        match self {
            Resolution::Found { run, .. } => Some(run),
            _ => None,
        }
    }

    /// Both misses report no PR id.
    pub fn pull_request_id(&self) -> Option<i64> {
        match self {
            Resolution::NoRuns { pull_request_id } | Resolution::Found { pull_request_id, .. } => {
                Some(*pull_request_id)
            }
            Resolution::RepoNotFound | Resolution::PrNotFound => None,
        }
    }
}

/// Source of "the latest run for this PR". The poller only depends on this.
#[async_trait]
pub trait RunLookup: Send + Sync {
    async fn latest_run(&self, reference: &PrReference) -> Result<Option<Run>, ApiError>;
}

/// Resolves references against a Backend: repos, then PRs, then runs.
pub struct Resolver<'a> {
    backend: &'a dyn Backend,
}

impl<'a> Resolver<'a> {
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Three sequential round trips, each depending on the previous one.
    #[instrument(skip(self), fields(owner = %reference.owner, repo = %reference.repo, pr = reference.pr_number))]
    pub async fn resolve(&self, reference: &PrReference) -> Result<Resolution, ApiError> {
        let full_name = reference.full_name().to_lowercase();
        let repos = self.backend.list_repositories().await?;
        let Some(repo) = repos.iter().find(|r| r.name.to_lowercase() == full_name) else {
            debug!(known = repos.len(), "repository not registered with backend");
            return Ok(Resolution::RepoNotFound);
        };

        let pull_requests = self.backend.list_pull_requests(repo.id).await?;
        let Some(pr) = pull_requests
            .iter()
            .find(|p| p.pr_number == reference.pr_number)
        else {
            debug!(repo_id = repo.id, "pull request not synced yet");
            return Ok(Resolution::PrNotFound);
        };

        debug!(pull_request_id = pr.id, title = ?pr.title, author = ?pr.author, state = ?pr.status, "matched pull request");
        let runs = self.backend.list_runs(pr.id).await?;
        debug!(pull_request_id = pr.id, runs = runs.len(), "loaded runs");
        Ok(match select_latest_run(runs) {
            Some(run) => Resolution::Found {
                pull_request_id: pr.id,
                run,
            },
            None => Resolution::NoRuns {
                pull_request_id: pr.id,
            },
        })
    }
}

#[async_trait]
impl RunLookup for Resolver<'_> {
    async fn latest_run(&self, reference: &PrReference) -> Result<Option<Run>, ApiError> {
        let resolution = self.resolve(reference).await?;
        debug!(pull_request_id = ?resolution.pull_request_id(), "resolved reference");
        Ok(resolution.into_run())
    }
}

/// Pick the most recent run: completedAt, else startedAt, newest first.
/// Missing or unparsable timestamps sort as the epoch. Ties keep backend order.
pub fn select_latest_run(mut runs: Vec<Run>) -> Option<Run> {
    sort_latest_first(&mut runs);
    runs.into_iter().next()
}

/// Order runs newest first by the same key `select_latest_run` uses.
pub fn sort_latest_first(runs: &mut [Run]) {
    runs.sort_by_key(|run| Reverse(recency_millis(run)));
}

fn recency_millis(run: &Run) -> i64 {
    non_empty(&run.completed_at)
        .or_else(|| non_empty(&run.started_at))
        .and_then(parse_timestamp_millis)
        .unwrap_or(0)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// RFC 3339, or a zone-less ISO local date-time read as UTC.
fn parse_timestamp_millis(value: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}
