use crate::api::types::{Finding, RunStatus, Severity, SuggestedPatch};

/// Everything needed to render one analysis run.
#[derive(Debug)]
pub struct Report {
    /// `owner/repo#n` when the run was reached through a PR reference
    pub pr: Option<String>,
    /// Backend run id
    pub run_id: i64,
    /// Final status of the run
    pub status: RunStatus,
    /// Commit the run analysed, if reported
    pub commit_sha: Option<String>,
    /// What started the run (webhook, manual sync, ...)
    pub triggered_by: Option<String>,
    /// Failure detail reported by the backend
    pub error_message: Option<String>,
    /// Distinct file paths with findings, in first-seen order
    pub files: Vec<String>,
    /// Findings as returned by the backend
    pub findings: Vec<Finding>,
    /// Non-zero finding counts, most severe first
    pub severity_counts: Vec<SeverityCount>,
    /// Highest severity across all findings (None when there are none)
    pub overall_severity: Option<Severity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityCount {
    pub severity: Severity,
    pub count: usize,
}

/// Explanation line for a suggested patch, `None` when there is nothing to say.
pub fn patch_summary(patch: &SuggestedPatch) -> Option<String> {
    let explanation = patch.explanation.as_deref().filter(|e| !e.trim().is_empty())?;
    match patch.applied {
        Some(true) => Some(format!("{} (applied)", explanation)),
        _ => Some(explanation.to_string()),
    }
}

/// `path · line N` or `path · line N–M`.
pub fn finding_location(finding: &Finding) -> String {
    match (finding.line_number, finding.end_line_number) {
        (Some(start), Some(end)) if end != start => {
            format!("{} · line {}–{}", finding.file_path, start, end)
        }
        (Some(start), _) => format!("{} · line {}", finding.file_path, start),
        (None, _) => finding.file_path.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(line: Option<u32>, end: Option<u32>) -> Finding {
        Finding {
            id: 1,
            file_path: "src/db.rs".to_string(),
            line_number: line,
            end_line_number: end,
            severity: Severity::High,
            category: "SECURITY".to_string(),
            title: "SQL injection".to_string(),
            description: None,
            code_snippet: None,
            suggested_patches: vec![],
        }
    }

    #[test]
    fn test_patch_summary() {
        let mut patch = SuggestedPatch {
            id: 1,
            unified_diff: None,
            explanation: Some("Use a bound parameter".to_string()),
            applied: None,
        };
        assert_eq!(patch_summary(&patch).as_deref(), Some("Use a bound parameter"));
        patch.applied = Some(true);
        assert_eq!(patch_summary(&patch).as_deref(), Some("Use a bound parameter (applied)"));
        patch.explanation = Some("  ".to_string());
        assert!(patch_summary(&patch).is_none());
    }

    #[test]
    fn test_finding_location() {
        assert_eq!(finding_location(&finding(None, None)), "src/db.rs");
        assert_eq!(finding_location(&finding(Some(4), None)), "src/db.rs · line 4");
        assert_eq!(finding_location(&finding(Some(4), Some(4))), "src/db.rs · line 4");
        assert_eq!(finding_location(&finding(Some(4), Some(9))), "src/db.rs · line 4–9");
    }
}
