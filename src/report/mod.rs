pub mod types;

pub use types::Report;

use crate::api::types::{Run, RunStatus, Severity};
use crate::pr::PrReference;
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};
use types::{finding_location, patch_summary, SeverityCount};

const NO_FINDINGS: &str = "No issues were found in this pull request.";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Build a Report from a backend run.
/// overall_severity is the max severity across findings.
pub fn build(run: Run, reference: Option<&PrReference>) -> Report {
    let mut files: Vec<String> = Vec::new();
    for finding in &run.findings {
        if !files.contains(&finding.file_path) {
            files.push(finding.file_path.clone());
        }
    }

    let severity_counts: Vec<SeverityCount> = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
        Severity::Unknown,
    ]
    .into_iter()
    .map(|severity| SeverityCount {
        severity,
        count: run.findings.iter().filter(|f| f.severity == severity).count(),
    })
    .filter(|c| c.count > 0)
    .collect();

    let overall_severity = run.findings.iter().map(|f| f.severity).max();

    Report {
        pr: reference.map(ToString::to_string),
        run_id: run.id,
        status: run.status,
        commit_sha: run.commit_sha,
        triggered_by: run.triggered_by,
        error_message: run.error_message.filter(|m| !m.is_empty()),
        files,
        findings: run.findings,
        severity_counts,
        overall_severity,
    }
}

/// Output the report to terminal (default) or to a markdown file.
#[instrument(skip(report), fields(run_id = report.run_id, status = %report.status))]
pub fn output(report: &Report, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            write_markdown_report(report, path)
        }
    }
}

/// Format and print the report to the terminal with colors:
///
/// Analysis Run #100 (acme/widgets#42)
/// Status: COMPLETED
///
/// ═══ Files involved ═══
///   src/db.rs
///
/// ═══ Findings & Recommendations ═══
/// • SQL injection (HIGH · SECURITY)
///   src/db.rs · line 12
fn print_terminal_report(report: &Report) {
    println!();
    match &report.pr {
        Some(pr) => println!("Analysis Run #{} ({})", report.run_id, pr),
        None => println!("Analysis Run #{}", report.run_id),
    }
    println!("Status: {}", colorize_status(report.status));
    if let Some(sha) = &report.commit_sha {
        println!("Commit: {}", sha);
    }
    if let Some(trigger) = &report.triggered_by {
        println!("Triggered by: {}", trigger);
    }
    if let Some(error) = &report.error_message {
        println!("Error: {}", error.red());
    }
    println!();

    if report.findings.is_empty() {
        println!("{}", NO_FINDINGS);
        println!();
        return;
    }

    println!("═══ Files involved ═══");
    for file in &report.files {
        println!("  {}", file);
    }
    println!();

    println!("═══ Findings & Recommendations ═══");
    for finding in &report.findings {
        println!(
            "• {} ({} · {})",
            finding.title.bold(),
            colorize_severity(finding.severity),
            finding.category
        );
        println!("  {}", finding_location(finding).dimmed());
        if let Some(description) = &finding.description {
            println!("  {}", description);
        }
        if let Some(snippet) = &finding.code_snippet {
            for line in snippet.lines() {
                println!("    {}", line.dimmed());
            }
        }
        let explanations: Vec<String> =
            finding.suggested_patches.iter().filter_map(patch_summary).collect();
        if !explanations.is_empty() {
            println!("  Suggested patches:");
            for explanation in explanations {
                println!("    - {}", explanation);
            }
        }
        println!();
    }

    let summary: Vec<String> = report
        .severity_counts
        .iter()
        .map(|c| format!("{} {}", c.count, colorize_severity(c.severity)))
        .collect();
    let highest = report
        .overall_severity
        .map(colorize_severity)
        .unwrap_or_else(|| "NONE".normal());
    println!(
        "═══ {} findings ({}), highest: {} ═══",
        report.findings.len(),
        summary.join(", "),
        highest
    );
    println!();
}

/// Write the report as a markdown file.
/// Same sections as the terminal output using markdown syntax.
fn write_markdown_report(report: &Report, path: &Path) -> Result<(), ReportError> {
    std::fs::write(path, render_markdown(report))?;
    Ok(())
}

fn render_markdown(report: &Report) -> String {
    let mut md = String::new();
    match &report.pr {
        Some(pr) => md.push_str(&format!("# Analysis Run #{} ({})\n\n", report.run_id, pr)),
        None => md.push_str(&format!("# Analysis Run #{}\n\n", report.run_id)),
    }
    md.push_str(&format!("**Status:** {}\n\n", report.status));
    if let Some(sha) = &report.commit_sha {
        md.push_str(&format!("**Commit:** `{}`\n\n", sha));
    }
    if let Some(trigger) = &report.triggered_by {
        md.push_str(&format!("**Triggered by:** {}\n\n", trigger));
    }
    if let Some(error) = &report.error_message {
        md.push_str(&format!("**Error:** `{}`\n\n", error));
    }

    if report.findings.is_empty() {
        md.push_str(NO_FINDINGS);
        md.push('\n');
        return md;
    }

    md.push_str("## Files involved\n\n");
    for file in &report.files {
        md.push_str(&format!("- `{}`\n", file));
    }
    md.push('\n');

    md.push_str("## Findings & Recommendations\n\n");
    for finding in &report.findings {
        md.push_str(&format!(
            "### {} ({} · {})\n\n",
            finding.title, finding.severity, finding.category
        ));
        md.push_str(&format!("`{}`\n\n", finding_location(finding)));
        if let Some(description) = &finding.description {
            md.push_str(&format!("{}\n\n", description));
        }
        if let Some(snippet) = &finding.code_snippet {
            md.push_str(&format!("```\n{}\n```\n\n", snippet.trim_end()));
        }
        if !finding.suggested_patches.is_empty() {
            md.push_str("**Suggested patches:**\n\n");
            for patch in &finding.suggested_patches {
                if let Some(summary) = patch_summary(patch) {
                    md.push_str(&format!("- {}\n", summary));
                }
                if let Some(diff) = patch.unified_diff.as_deref().filter(|d| !d.trim().is_empty()) {
                    md.push_str(&format!("\n```diff\n{}\n```\n", diff.trim_end()));
                }
            }
            md.push('\n');
        }
    }

    let summary: Vec<String> = report
        .severity_counts
        .iter()
        .map(|c| format!("{} {}", c.count, c.severity))
        .collect();
    md.push_str(&format!("## Summary: {}\n", summary.join(", ")));
    if let Some(highest) = report.overall_severity {
        md.push_str(&format!("\n**Highest severity: {}**\n", highest));
    }
    md
}

fn colorize_status(status: RunStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        RunStatus::Completed => label.green().bold(),
        RunStatus::Failed => label.red().bold(),
        RunStatus::Pending | RunStatus::InProgress => label.yellow().bold(),
        RunStatus::Cancelled | RunStatus::Unknown => label.normal(),
    }
}

fn colorize_severity(severity: Severity) -> colored::ColoredString {
    let label = severity.to_string();
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.green(),
        Severity::Info | Severity::Unknown => label.normal(),
    }
}
