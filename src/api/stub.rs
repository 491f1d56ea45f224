//! In-memory Backend used by resolver, poller and flow tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::{AuthResponse, PullRequest, Repository, Run, RunStatus, SyncResponse};
use super::{ApiError, Backend};
use crate::pr::PrReference;

#[derive(Default)]
pub struct StubBackend {
    pub repos: Vec<Repository>,
    pub pull_requests: HashMap<i64, Vec<PullRequest>>,
    pub runs: HashMap<i64, Vec<Run>>,
    /// When set, sync fails with this HTTP status
    pub sync_status: Option<u16>,
    /// When set, listing repositories fails with this HTTP status
    pub repos_status: Option<u16>,
    pub sync_calls: AtomicUsize,
    pub repo_calls: AtomicUsize,
}

impl StubBackend {
    pub fn with_repo(mut self, id: i64, name: &str) -> Self {
        self.repos.push(Repository {
            id,
            name: name.to_string(),
            clone_url: None,
            default_branch: None,
        });
        self
    }

    pub fn with_pull_request(mut self, id: i64, repo_id: i64, pr_number: u64) -> Self {
        self.pull_requests.entry(repo_id).or_default().push(PullRequest {
            id,
            repo_id,
            pr_number,
            title: None,
            author: None,
            status: None,
        });
        self
    }

    pub fn with_run(mut self, run: Run) -> Self {
        self.runs.entry(run.pull_request_id).or_default().push(run);
        self
    }
}

pub fn run(id: i64, pull_request_id: i64, status: RunStatus) -> Run {
    Run {
        id,
        pull_request_id,
        status,
        commit_sha: None,
        triggered_by: None,
        started_at: None,
        completed_at: None,
        error_message: None,
        findings: Vec::new(),
    }
}

pub fn reference(owner: &str, repo: &str, pr_number: u64) -> PrReference {
    PrReference {
        owner: owner.to_string(),
        repo: repo.to_string(),
        pr_number,
    }
}

#[async_trait]
impl Backend for StubBackend {
    async fn health(&self) -> bool {
        true
    }

    async fn login(&self, username: &str, _password: &str) -> Result<AuthResponse, ApiError> {
        Ok(AuthResponse {
            token: format!("token-for-{username}"),
            username: Some(username.to_string()),
            expires_in: None,
        })
    }

    async fn sync_pull_request(&self, reference: &PrReference) -> Result<SyncResponse, ApiError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.sync_status {
            return Err(ApiError::Status {
                operation: "sync PR",
                status,
            });
        }
        Ok(SyncResponse {
            success: true,
            repository: Some(reference.full_name()),
            pr_number: Some(reference.pr_number),
            ..SyncResponse::default()
        })
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, ApiError> {
        self.repo_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.repos_status {
            return Err(ApiError::Status {
                operation: "load repositories",
                status,
            });
        }
        Ok(self.repos.clone())
    }

    async fn list_pull_requests(&self, repo_id: i64) -> Result<Vec<PullRequest>, ApiError> {
        Ok(self.pull_requests.get(&repo_id).cloned().unwrap_or_default())
    }

    async fn list_runs(&self, pull_request_id: i64) -> Result<Vec<Run>, ApiError> {
        Ok(self.runs.get(&pull_request_id).cloned().unwrap_or_default())
    }

    async fn run(&self, run_id: i64) -> Result<Run, ApiError> {
        self.runs
            .values()
            .flatten()
            .find(|r| r.id == run_id)
            .cloned()
            .ok_or(ApiError::Status {
                operation: "load run",
                status: 404,
            })
    }
}
