//! Core data model for reconciliation runs
//!
//! Everything here is a plain snapshot or a derived record: work items are
//! fetched once per run, inconsistencies are recomputed every run and never
//! persisted, fix results are created only during a fix pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an issue as tracked by the issue system itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueState::Open => "OPEN",
            IssueState::Closed => "CLOSED",
        }
    }
}

/// Immutable snapshot of a unit of work, fetched once per run.
///
/// `board_item_ref` and `board_ref` are opaque node ids used for mutation.
/// They are both `None` (item not on any board) or both `Some`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkItem {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub state: IssueState,
    pub closed_at: Option<DateTime<Utc>>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    /// Single-select "Status" value on the board, `None` if not on a board.
    pub board_status: Option<String>,
    pub priority: Option<String>,
    pub size: Option<String>,
    pub board_item_ref: Option<String>,
    pub board_ref: Option<String>,
}

impl WorkItem {
    /// True when the item has board handles to act on.
    pub fn on_board(&self) -> bool {
        self.board_item_ref.is_some() && self.board_ref.is_some()
    }
}

/// How serious a detected inconsistency is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Info,
}

/// A single detected divergence between issue state and board status.
///
/// Derived, never stored; recomputed on every run.
#[derive(Debug, Clone, Serialize)]
pub struct Inconsistency {
    pub number: u64,
    pub issue_state: IssueState,
    pub project_status: Option<String>,
    pub severity: Severity,
    pub description: String,
}

/// Corrective action attempted by the fix executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixAction {
    Close,
    UpdateStatus,
    BackfillTimestamp,
}

/// Outcome of one attempted corrective action. Never retried within a run.
#[derive(Debug, Clone, Serialize)]
pub struct FixResult {
    pub number: u64,
    pub action: FixAction,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FixResult {
    pub fn ok(number: u64, action: FixAction) -> Self {
        Self {
            number,
            action,
            success: true,
            error: None,
        }
    }

    pub fn failed(number: u64, action: FixAction, error: impl Into<String>) -> Self {
        Self {
            number,
            action,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Aggregated counts for one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_checked: usize,
    pub total_inconsistencies: usize,
    pub errors: usize,
    pub info: usize,
    pub fixed: usize,
    pub fix_failures: usize,
}

impl Summary {
    /// Roll per-item outcomes into counts.
    pub fn tally(total_checked: usize, inconsistencies: &[Inconsistency], fixes: &[FixResult]) -> Self {
        Self {
            total_checked,
            total_inconsistencies: inconsistencies.len(),
            errors: inconsistencies
                .iter()
                .filter(|i| i.severity == Severity::Error)
                .count(),
            info: inconsistencies
                .iter()
                .filter(|i| i.severity == Severity::Info)
                .count(),
            fixed: fixes.iter().filter(|f| f.success).count(),
            fix_failures: fixes.iter().filter(|f| !f.success).count(),
        }
    }
}

/// The result shape handed to the CLI for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub inconsistencies: Vec<Inconsistency>,
    pub fixes: Vec<FixResult>,
    pub summary: Summary,
}

impl ReconcileReport {
    pub fn new(total_checked: usize, inconsistencies: Vec<Inconsistency>, fixes: Vec<FixResult>) -> Self {
        let summary = Summary::tally(total_checked, &inconsistencies, &fixes);
        Self {
            inconsistencies,
            fixes,
            summary,
        }
    }

    /// Process exit code: failure if any fix failed, else failure if fixing
    /// was not requested and error-severity inconsistencies remain.
    pub fn exit_code(&self, fix_requested: bool) -> i32 {
        if self.summary.fix_failures > 0 {
            return 1;
        }
        if !fix_requested && self.summary.errors > 0 {
            return 1;
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_inconsistency(number: u64) -> Inconsistency {
        Inconsistency {
            number,
            issue_state: IssueState::Open,
            project_status: Some("Done".to_string()),
            severity: Severity::Error,
            description: "test".to_string(),
        }
    }

    #[test]
    fn test_summary_tally() {
        let inconsistencies = vec![
            error_inconsistency(1),
            Inconsistency {
                number: 2,
                issue_state: IssueState::Closed,
                project_status: Some("Backlog".to_string()),
                severity: Severity::Info,
                description: "test".to_string(),
            },
        ];
        let fixes = vec![
            FixResult::ok(1, FixAction::Close),
            FixResult::failed(2, FixAction::UpdateStatus, "boom"),
        ];
        let summary = Summary::tally(10, &inconsistencies, &fixes);
        assert_eq!(summary.total_checked, 10);
        assert_eq!(summary.total_inconsistencies, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.info, 1);
        assert_eq!(summary.fixed, 1);
        assert_eq!(summary.fix_failures, 1);
    }

    #[test]
    fn test_exit_code_clean_run() {
        let report = ReconcileReport::new(5, vec![], vec![]);
        assert_eq!(report.exit_code(false), 0);
        assert_eq!(report.exit_code(true), 0);
    }

    #[test]
    fn test_exit_code_unfixed_errors() {
        let report = ReconcileReport::new(5, vec![error_inconsistency(1)], vec![]);
        assert_eq!(report.exit_code(false), 1);
        // Fix was requested and nothing failed, so the run is clean even if
        // the classification listed errors.
        assert_eq!(report.exit_code(true), 0);
    }

    #[test]
    fn test_exit_code_fix_failures_always_fail() {
        let fixes = vec![FixResult::failed(1, FixAction::Close, "api error")];
        let report = ReconcileReport::new(5, vec![error_inconsistency(1)], fixes);
        assert_eq!(report.exit_code(true), 1);
        assert_eq!(report.exit_code(false), 1);
    }

    #[test]
    fn test_fix_result_serializes_error_only_on_failure() {
        let ok = serde_json::to_value(FixResult::ok(1, FixAction::Close)).unwrap();
        assert!(ok.get("error").is_none());
        assert_eq!(ok["action"], "close");

        let failed = serde_json::to_value(FixResult::failed(2, FixAction::BackfillTimestamp, "nope")).unwrap();
        assert_eq!(failed["error"], "nope");
        assert_eq!(failed["action"], "backfill-timestamp");
    }
}
