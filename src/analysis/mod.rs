use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use crate::api::{ApiError, Backend, Run, RunStatus};
use crate::poller::{self, PollError};
use crate::pr::{self, ParseError, PrReference};
use crate::resolver::Resolver;
use crate::session::Session;

/// Why a submission ended without a completed run.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Input was not a recognisable PR reference; nothing was sent
    #[error(transparent)]
    Validation(#[from] ParseError),

    /// Sync or lookup request failed; no retry
    #[error(transparent)]
    Network(#[from] ApiError),

    #[error("Timed out waiting for analysis results. Please try again in a moment.")]
    Timeout,

    /// The run finished with status FAILED
    #[error("{message}")]
    RunFailed { message: String, run: Box<Run> },

    #[error("Analysis was cancelled")]
    Cancelled,
}

impl From<PollError> for FlowError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::Api(api) => FlowError::Network(api),
            PollError::Cancelled => FlowError::Cancelled,
        }
    }
}

/// Submit a PR for analysis and wait for the outcome.
///
/// Parse → sync → poll. Every failure is terminal for this submission; the
/// caller resubmits to retry. Each call owns its own polling state, so
/// overlapping submissions do not interfere.
pub async fn analyze_pull_request(
    session: &Session,
    backend: &dyn Backend,
    input: &str,
    cancel: &CancellationToken,
) -> Result<Run, FlowError> {
    let reference = pr::parse_pr_reference(input)?;
    let span = info_span!("analyze_pr", pr = %reference);
    run_flow(session, backend, &reference, cancel)
        .instrument(span)
        .await
}

async fn run_flow(
    session: &Session,
    backend: &dyn Backend,
    reference: &PrReference,
    cancel: &CancellationToken,
) -> Result<Run, FlowError> {
    info!("Syncing pull request and starting analysis...");
    let sync = backend.sync_pull_request(reference).await?;
    info!(
        repository = ?sync.repository,
        pr_number = ?sync.pr_number,
        title = ?sync.pr_title,
        author = ?sync.pr_author,
        message = ?sync.message,
        "sync accepted"
    );

    info!("Waiting for analysis to complete...");
    let resolver = Resolver::new(backend);
    let run = poller::poll_for_completed_run(&resolver, reference, session.poll, cancel)
        .await?
        .ok_or(FlowError::Timeout)?;

    if run.status == RunStatus::Failed {
        let message = run
            .error_message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Analysis run failed".to_string());
        return Err(FlowError::RunFailed {
            message,
            run: Box::new(run),
        });
    }

    info!(run_id = run.id, findings = run.findings.len(), "Analysis completed successfully.");
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::stub::{run, StubBackend};
    use crate::api::HttpBackend;
    use crate::config::Config;
    use crate::poller::PollOptions;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn test_session(timeout_ms: u64, interval_ms: u64) -> Session {
        let mut session = Session::init(&Config::default());
        session.poll = PollOptions {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(interval_ms),
        };
        session
    }

    fn acme_backend() -> StubBackend {
        StubBackend::default()
            .with_repo(1, "acme/widgets")
            .with_pull_request(10, 1, 42)
    }

    fn failed_run(message: Option<&str>) -> Run {
        let mut r = run(100, 10, RunStatus::Failed);
        r.error_message = message.map(str::to_string);
        r
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_surfaces_error_message() {
        let backend = acme_backend().with_run(failed_run(Some("build broke")));
        let err = analyze_pull_request(
            &test_session(90_000, 3_000),
            &backend,
            "https://github.com/acme/widgets/pull/42",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "build broke");
        match err {
            FlowError::RunFailed { run, .. } => assert_eq!(run.id, 100),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(backend.sync_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_without_message_uses_fallback() {
        let backend = acme_backend().with_run(failed_run(None));
        let err = analyze_pull_request(
            &test_session(1_000, 10),
            &backend,
            "acme/widgets#42",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Analysis run failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_run_is_success() {
        let backend = acme_backend().with_run(run(100, 10, RunStatus::Completed));
        let completed = analyze_pull_request(
            &test_session(1_000, 10),
            &backend,
            "acme/widgets#42",
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(completed.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_backend() {
        let backend = acme_backend();
        let err = analyze_pull_request(
            &test_session(1_000, 10),
            &backend,
            "not a url",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
        assert_eq!(backend.sync_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sync_failure_aborts_before_polling() {
        let backend = StubBackend {
            sync_status: Some(500),
            ..acme_backend()
        };
        let err = analyze_pull_request(
            &test_session(1_000, 10),
            &backend,
            "acme/widgets#42",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Failed to sync PR (status 500)");
        assert_eq!(backend.repo_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsynced_pr_times_out() {
        // PR never shows up: resolution misses keep the poller going
        let backend = StubBackend::default().with_repo(1, "acme/widgets");
        let err = analyze_pull_request(
            &test_session(100, 10),
            &backend,
            "acme/widgets#42",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FlowError::Timeout));
        assert!(err.to_string().contains("try again in a moment"));
        assert!(backend.repo_calls.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let backend = acme_backend().with_run(run(100, 10, RunStatus::Pending));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = analyze_pull_request(&test_session(1_000, 10), &backend, "acme/widgets#42", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Cancelled));
    }

    #[tokio::test]
    async fn test_end_to_end_over_http() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/github/sync/acme/widgets/pr/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "repository": "acme/widgets", "prNumber": 42
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "name": "acme/widgets", "cloneUrl": "https://github.com/acme/widgets.git"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/pullrequests/repo/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 10, "repoId": 1, "prNumber": 42, "title": "Add login"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/runs/pull-request/10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 99, "pullRequestId": 10, "status": "COMPLETED", "completedAt": "2024-01-01T00:00:00"},
                {"id": 100, "pullRequestId": 10, "status": "FAILED", "errorMessage": "build broke",
                 "startedAt": "2024-02-01T00:00:00", "completedAt": "2024-02-01T00:01:00"}
            ])))
            .mount(&server)
            .await;

        let mut session = test_session(5_000, 50);
        session.api_base = format!("{}/api", server.uri());
        let backend = HttpBackend::from_session(&session).unwrap();

        let err = analyze_pull_request(
            &session,
            &backend,
            "https://github.com/acme/widgets/pull/42",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "build broke");
    }
}
