pub mod types;

pub use types::PrReference;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Please enter a pull request reference")]
    Empty,

    #[error(
        "Invalid pull request reference '{0}': expected https://github.com/owner/repo/pull/123 or owner/repo#123"
    )]
    Unrecognized(String),
}

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)github\.com/([^/]+)/([^/]+)/pull/(\d+)").expect("valid regex"));

static SHORTHAND_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^/\s]+)/([^/#\s]+)#(\d+)$").expect("valid regex"));

/// Parse a user-supplied pull request reference.
///
/// Accepted forms:
///   https://github.com/{owner}/{repo}/pull/{number}  (found anywhere in the input)
///   {owner}/{repo}#{number}                          (must be the whole input)
///
/// Surrounding whitespace is ignored. A PR number of zero, or one that does not
/// fit in a u64, is rejected like any other malformed input.
pub fn parse_pr_reference(input: &str) -> Result<PrReference, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let captures = URL_PATTERN
        .captures(trimmed)
        .or_else(|| SHORTHAND_PATTERN.captures(trimmed))
        .ok_or_else(|| ParseError::Unrecognized(trimmed.to_string()))?;

    let pr_number = captures[3]
        .parse::<u64>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ParseError::Unrecognized(trimmed.to_string()))?;

    let reference = PrReference {
        owner: captures[1].to_string(),
        repo: captures[2].to_string(),
        pr_number,
    };
    debug!(owner = %reference.owner, repo = %reference.repo, pr = reference.pr_number, "parsed PR reference");
    Ok(reference)
}
