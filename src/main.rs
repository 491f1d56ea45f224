mod analysis;
mod api;
mod config;
mod poller;
mod pr;
mod report;
mod resolver;
mod session;

use api::{ApiError, AuthResponse, Backend, HttpBackend, PullRequest, Run};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Patch Pilot: submit a GitHub Pull Request to the Patch Pilot backend,
/// wait for the analysis run to finish and report its findings.
#[derive(Parser, Debug)]
#[command(name = "patch-pilot", version, about)]
struct Cli {
    /// Backend API base URL (overrides .patch-pilot.toml and PATCH_PILOT_API_BASE_URL)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Bearer token for the backend (overrides .patch-pilot.toml and PATCH_PILOT_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync a pull request, wait for its analysis run and print the findings
    Analyze {
        /// https://github.com/owner/repo/pull/123 or owner/repo#123
        pr_ref: String,

        /// Optional output file path for markdown report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Give up waiting after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Delay between run lookups in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Check whether the backend is up
    Health,

    /// Log in and obtain a bearer token
    Login {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        password: String,

        /// Store the token in .patch-pilot.toml instead of printing it
        #[arg(long)]
        save: bool,
    },

    /// List repositories known to the backend
    Repos,

    /// List synced pull requests of a repository
    Prs { repo_id: i64 },

    /// List analysis runs of a pull request, newest first
    Runs { pull_request_id: i64 },

    /// Show a single analysis run by id
    Run {
        id: i64,

        /// Optional output file path for markdown report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run_cli(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {}", "Error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

async fn run_cli(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    info!("loading configuration");
    let mut config = config::Config::load()?;
    if let Some(api_base) = cli.api_base {
        config.api.base_url = Some(api_base);
    }
    if let Some(token) = cli.token {
        config.api.token = Some(token);
    }

    let mut session = session::Session::init(&config);
    let backend = HttpBackend::from_session(&session)?;

    let result = execute(cli.command, &mut session, &backend).await;
    session.teardown();
    result
}

async fn execute(
    command: Command,
    session: &mut session::Session,
    backend: &HttpBackend,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Analyze {
            pr_ref,
            output,
            timeout_secs,
            interval_ms,
        } => {
            if let Some(secs) = timeout_secs {
                session.poll.timeout = Duration::from_secs(secs);
            }
            if let Some(ms) = interval_ms {
                session.poll.interval = Duration::from_millis(ms);
            }
            analyze(session, backend, &pr_ref, output).await
        }
        Command::Health => {
            let status = if backend.health().await {
                "UP".green().bold()
            } else {
                "DOWN".red().bold()
            };
            println!("Backend health: {} ({})", status, session.api_base);
            Ok(())
        }
        Command::Login {
            username,
            password,
            save,
        } => {
            let save_to = save.then(config::Config::default_path);
            login(session, backend, &username, &password, save_to)
                .await
                .map(|auth| print_login(&auth, save_to))
        }
        Command::Repos => list_repos(backend).await,
        Command::Prs { repo_id } => print_lines(
            pull_request_lines(backend, repo_id).await?,
            &format!("No pull requests synced for repository {repo_id}."),
        ),
        Command::Runs { pull_request_id } => print_lines(
            run_lines(backend, pull_request_id).await?,
            &format!("No analysis runs for pull request {pull_request_id}."),
        ),
        Command::Run { id, output } => {
            let run = backend.run(id).await?;
            report::output(&report::build(run, None), output.as_deref())?;
            Ok(())
        }
    }
}

async fn analyze(
    session: &session::Session,
    backend: &dyn Backend,
    pr_ref: &str,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    let outcome = analysis::analyze_pull_request(session, backend, pr_ref, &cancel).await;
    let reference = pr::parse_pr_reference(pr_ref).ok();

    match outcome {
        Ok(run) => {
            debug!(run_id = run.id, "rendering completed run");
            let built_report = report::build(run, reference.as_ref());
            report::output(&built_report, output.as_deref())?;
            Ok(())
        }
        Err(analysis::FlowError::RunFailed { message, run }) => {
            let built_report = report::build(*run, reference.as_ref());
            report::output(&built_report, output.as_deref())?;
            Err(message.into())
        }
        Err(err) => Err(err.into()),
    }
}

async fn list_repos(backend: &dyn Backend) -> Result<(), Box<dyn std::error::Error>> {
    let repos = backend.list_repositories().await?;
    if repos.is_empty() {
        println!("No repositories registered.");
        return Ok(());
    }
    for repo in repos {
        println!(
            "{:>5}  {}  {}  ({})",
            repo.id,
            repo.name.bold(),
            repo.clone_url.as_deref().unwrap_or("-"),
            repo.default_branch.as_deref().unwrap_or("default branch unknown")
        );
    }
    Ok(())
}

/// Exchange credentials for a token and hand it to the session, so the
/// backend sends it from now on. With `save_to`, also persist it.
async fn login(
    session: &session::Session,
    backend: &dyn Backend,
    username: &str,
    password: &str,
    save_to: Option<&Path>,
) -> Result<AuthResponse, Box<dyn std::error::Error>> {
    let auth = backend.login(username, password).await?;
    session.set_token(auth.token.clone());
    if let Some(path) = save_to {
        config::Config::save_token(path, &auth.token)?;
        info!(path = %path.display(), "token saved");
    }
    Ok(auth)
}

fn print_login(auth: &AuthResponse, saved_to: Option<&Path>) {
    let who = auth.username.as_deref().unwrap_or("user");
    match auth.expires_in {
        Some(secs) => println!("Logged in as {} (token expires in {}s)", who.bold(), secs),
        None => println!("Logged in as {}", who.bold()),
    }
    match saved_to {
        Some(path) => println!("Token saved to {}", path.display()),
        None => println!("export PATCH_PILOT_TOKEN={}", auth.token),
    }
}

fn print_lines(lines: Vec<String>, empty: &str) -> Result<(), Box<dyn std::error::Error>> {
    if lines.is_empty() {
        println!("{}", empty);
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

async fn pull_request_lines(backend: &dyn Backend, repo_id: i64) -> Result<Vec<String>, ApiError> {
    let pull_requests = backend.list_pull_requests(repo_id).await?;
    Ok(pull_requests.iter().map(pull_request_line).collect())
}

fn pull_request_line(pr: &PullRequest) -> String {
    format!(
        "{:>5}  #{:<5} {}  by {}  [{}]",
        pr.id,
        pr.pr_number,
        pr.title.as_deref().unwrap_or("(untitled)"),
        pr.author.as_deref().unwrap_or("unknown"),
        pr.status.as_deref().unwrap_or("UNKNOWN")
    )
}

async fn run_lines(backend: &dyn Backend, pull_request_id: i64) -> Result<Vec<String>, ApiError> {
    let mut runs = backend.list_runs(pull_request_id).await?;
    resolver::sort_latest_first(&mut runs);
    Ok(runs.iter().map(run_line).collect())
}

fn run_line(run: &Run) -> String {
    let mut line = format!(
        "{:>5}  {:<11}  started {}  completed {}  {} findings",
        run.id,
        run.status.to_string(),
        run.started_at.as_deref().unwrap_or("-"),
        run.completed_at.as_deref().unwrap_or("-"),
        run.findings.len()
    );
    if let Some(error) = run.error_message.as_deref().filter(|e| !e.is_empty()) {
        line.push_str(&format!("  error: {}", error));
    }
    line
}
