#[cfg(test)]
pub mod stub;
pub mod types;

pub use types::{AuthResponse, PullRequest, Repository, Run, RunStatus, SyncResponse};

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::pr::PrReference;
use crate::session::{Credential, Session};
use types::{HealthResponse, LoginRequest};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to {operation} (status {status})")]
    Status { operation: &'static str, status: u16 },

    #[error("Backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to {operation}: malformed response ({source})")]
    Decode {
        operation: &'static str,
        source: serde_json::Error,
    },
}

/// The Patch Pilot REST API as seen by this client.
/// Implementations must be Send + Sync so a single backend can serve
/// overlapping submissions.
#[async_trait]
pub trait Backend: Send + Sync {
    /// GET /actuator/health. Any failure counts as DOWN.
    async fn health(&self) -> bool;

    /// POST /auth/login. Bad credentials come back as status 401.
    async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError>;

    /// POST /github/sync/{owner}/{repo}/pr/{number} to queue analysis.
    async fn sync_pull_request(&self, reference: &PrReference) -> Result<SyncResponse, ApiError>;

    /// GET /repos
    async fn list_repositories(&self) -> Result<Vec<Repository>, ApiError>;

    /// GET /pullrequests/repo/{repoId}
    async fn list_pull_requests(&self, repo_id: i64) -> Result<Vec<PullRequest>, ApiError>;

    /// GET /runs/pull-request/{pullRequestId}
    async fn list_runs(&self, pull_request_id: i64) -> Result<Vec<Run>, ApiError>;

    /// GET /runs/{id}
    async fn run(&self, run_id: i64) -> Result<Run, ApiError>;
}

/// reqwest-backed implementation talking JSON over HTTP.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: Credential,
}

impl HttpBackend {
    pub fn new(api_base: &str, token: Option<&str>, timeout: Duration) -> Result<Self, ApiError> {
        Self::with_credential(api_base, Credential::new(token.map(str::to_string)), timeout)
    }

    /// Build a backend that reads the session's live token on every request,
    /// so login and teardown on the session apply to it.
    pub fn from_session(session: &Session) -> Result<Self, ApiError> {
        Self::with_credential(&session.api_base, session.credential(), session.request_timeout)
    }

    fn with_credential(api_base: &str, token: Credential, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header(USER_AGENT, "patch-pilot");
        match self.token.get() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        operation: &'static str,
    ) -> Result<T, ApiError> {
        debug!(path, "GET");
        let response = self.request(Method::GET, path).send().await?;
        decode(response, operation).await
    }
}

/// Map non-2xx to ApiError::Status, then decode the JSON body.
async fn decode<T: DeserializeOwned>(
    response: Response,
    operation: &'static str,
) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status {
            operation,
            status: status.as_u16(),
        });
    }
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|source| ApiError::Decode { operation, source })
}

#[async_trait]
impl Backend for HttpBackend {
    async fn health(&self) -> bool {
        let response = match self.request(Method::GET, "/actuator/health").send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "health check request failed");
                return false;
            }
        };
        match decode::<HealthResponse>(response, "check health").await {
            Ok(health) => health.status == "UP",
            Err(err) => {
                debug!(error = %err, "health check returned an error");
                false
            }
        }
    }

    #[instrument(skip(self, password))]
    async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        debug!("POST /auth/login");
        let response = self
            .request(Method::POST, "/auth/login")
            .json(&LoginRequest { username, password })
            .send()
            .await?;
        decode(response, "log in").await
    }

    #[instrument(skip(self), fields(owner = %reference.owner, repo = %reference.repo, pr = reference.pr_number))]
    async fn sync_pull_request(&self, reference: &PrReference) -> Result<SyncResponse, ApiError> {
        let path = format!(
            "/github/sync/{}/{}/pr/{}",
            urlencoding::encode(&reference.owner),
            urlencoding::encode(&reference.repo),
            reference.pr_number
        );
        debug!(path = %path, "POST");
        let response = self.request(Method::POST, &path).send().await?;
        let sync: SyncResponse = decode(response, "sync PR").await?;
        if !sync.success {
            warn!(error = ?sync.error, "backend accepted the sync request but reported no success");
        }
        Ok(sync)
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, ApiError> {
        self.get_json("/repos", "load repositories").await
    }

    async fn list_pull_requests(&self, repo_id: i64) -> Result<Vec<PullRequest>, ApiError> {
        self.get_json(&format!("/pullrequests/repo/{repo_id}"), "load pull requests")
            .await
    }

    async fn list_runs(&self, pull_request_id: i64) -> Result<Vec<Run>, ApiError> {
        self.get_json(
            &format!("/runs/pull-request/{pull_request_id}"),
            "load runs for pull request",
        )
        .await
    }

    async fn run(&self, run_id: i64) -> Result<Run, ApiError> {
        self.get_json(&format!("/runs/{run_id}"), "load run").await
    }
}
