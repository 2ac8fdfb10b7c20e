//! Merged-PR auto-detection for an issue
//!
//! Used to decide whether an issue's work already shipped: first by
//! matching the current local branch against merged PR source branches,
//! then by scanning merged PR bodies for structured closing references.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::git_state::is_protected_branch;
use crate::github::BoardApi;

fn closing_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:clos(?:e|es|ed|ing)|fix(?:es|ed|ing)?|resolv(?:e|es|ed|ing))\s*:?\s+#(\d+)")
            .unwrap()
    })
}

/// Issue numbers referenced by `closes/fixes/resolves #n` phrases.
pub fn closing_references(body: &str) -> HashSet<u64> {
    closing_ref_re()
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// Find the merged PR that completed an issue, or `None`.
///
/// Strategy 1 matches merged PRs by source branch and is skipped when the
/// local branch is protected or cannot be determined. Strategy 2 searches
/// merged PR bodies mentioning `#<n>` and keeps only candidates whose
/// parsed closing references actually contain the issue number, so a
/// mention of `#220` never satisfies issue 22. API failures count as "no
/// candidates"; the caller proceeds without a match.
pub async fn find_merged_pr_for_issue<A: BoardApi>(
    api: &A,
    current_branch: Option<&str>,
    issue_number: u64,
) -> Option<u64> {
    if let Some(branch) = current_branch {
        if !is_protected_branch(branch) {
            match api.merged_prs_for_branch(branch).await {
                Ok(prs) => {
                    if let Some(pr) = prs.first() {
                        return Some(pr.number);
                    }
                }
                Err(err) => {
                    debug!(branch, "merged PR lookup by branch failed: {}", err);
                }
            }
        }
    }

    let candidates = match api.merged_prs_mentioning(issue_number).await {
        Ok(prs) => prs,
        Err(err) => {
            debug!(issue_number, "merged PR body search failed: {}", err);
            return None;
        }
    };

    candidates
        .into_iter()
        .find(|pr| closing_references(&pr.body).contains(&issue_number))
        .map(|pr| pr.number)
}
