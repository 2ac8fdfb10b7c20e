//! Issue-state vs board-status inconsistency rules
//!
//! Pure classification over a fetched snapshot. No I/O, total over any
//! input, output order matches input order.

use crate::model::{Inconsistency, IssueState, Severity, WorkItem};

/// Board statuses considered terminal when no configuration overrides them.
pub const DEFAULT_DONE_STATUSES: &[&str] = &["Done", "Released"];

/// Board statuses implying active work began. A CLOSED issue sitting in one
/// of these is an error; a CLOSED issue in a pre-work column may be an
/// intentional "won't do" and is only informational.
pub const WORK_STARTED_STATUSES: &[&str] = &["In Progress", "Review", "Pending", "Testing"];

/// Classify each item independently against the done-status set.
///
/// Status comparison is case-sensitive and exact: "done" never matches
/// "Done". Items off the board, with an empty status, or with a terminal
/// status on a CLOSED issue are never flagged.
pub fn classify(items: &[WorkItem], done_statuses: &[String]) -> Vec<Inconsistency> {
    let mut out = Vec::new();

    for item in items {
        let status = match item.board_status.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => continue,
        };
        let is_done_status = done_statuses.iter().any(|d| d == status);

        match item.state {
            IssueState::Open if is_done_status => {
                out.push(Inconsistency {
                    number: item.number,
                    issue_state: IssueState::Open,
                    project_status: Some(status.to_string()),
                    severity: Severity::Error,
                    description: format!(
                        "Issue #{} is OPEN but board status is '{}'",
                        item.number, status
                    ),
                });
            }
            IssueState::Closed if !is_done_status => {
                let severity = if WORK_STARTED_STATUSES.contains(&status) {
                    Severity::Error
                } else {
                    Severity::Info
                };
                out.push(Inconsistency {
                    number: item.number,
                    issue_state: IssueState::Closed,
                    project_status: Some(status.to_string()),
                    severity,
                    description: format!(
                        "Issue #{} is CLOSED but board status is '{}'",
                        item.number, status
                    ),
                });
            }
            _ => {}
        }
    }

    out
}

/// The default done-status set as owned strings, for callers without config.
pub fn default_done_statuses() -> Vec<String> {
    DEFAULT_DONE_STATUSES.iter().map(|s| s.to_string()).collect()
}
