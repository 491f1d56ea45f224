use std::fmt;

/// A GitHub pull request identified by repository and number.
/// Produced by parse_pr_reference() in pr/mod.rs; discarded after one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrReference {
    /// Repository owner (user or organisation), never contains `/`
    pub owner: String,
    /// Repository name, never contains `/`
    pub repo: String,
    /// PR number, always > 0
    pub pr_number: u64,
}

impl PrReference {
    /// `owner/repo`, the key the backend stores repositories under.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for PrReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.pr_number)
    }
}
