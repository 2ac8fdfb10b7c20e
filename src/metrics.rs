//! Timestamp hygiene and staleness rules
//!
//! Checks the free-text date fields a board carries next to its status
//! column: terminal items should have a completion timestamp recorded, and
//! in-progress items should not sit untouched past a threshold. Pure given
//! an injected clock.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{Inconsistency, Severity, WorkItem};

/// Text field values per board item: `board_item_ref -> field name -> value`.
pub type TextFieldValues = HashMap<String, HashMap<String, String>>;

/// Statuses whose items are expected to carry a completion timestamp.
const COMPLETED_STATUSES: &[&str] = &["Done", "Released"];

const IN_PROGRESS_STATUS: &str = "In Progress";

pub const DEFAULT_STALE_THRESHOLD_DAYS: i64 = 14;

/// Maps a board status to the name of the free-text field holding its
/// timestamp, plus the staleness threshold for in-progress items.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub status_date_fields: HashMap<String, String>,
    pub stale_threshold_days: i64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        let mut status_date_fields = HashMap::new();
        status_date_fields.insert("In Progress".to_string(), "Started".to_string());
        status_date_fields.insert("Done".to_string(), "Completed".to_string());
        status_date_fields.insert("Released".to_string(), "Completed".to_string());
        Self {
            status_date_fields,
            stale_threshold_days: DEFAULT_STALE_THRESHOLD_DAYS,
        }
    }
}

/// Name of the completion field a terminal item should have recorded but
/// does not. `None` when the item is off the board, not terminal, has no
/// mapped field, or already carries a value. Shared between the classifier
/// and the backfill fix pass so the two always agree.
pub fn missing_completion_field<'a>(
    item: &WorkItem,
    text_values: &TextFieldValues,
    cfg: &'a MetricsConfig,
) -> Option<&'a str> {
    let item_ref = item.board_item_ref.as_deref()?;
    let status = item.board_status.as_deref().filter(|s| !s.is_empty())?;
    if !COMPLETED_STATUSES.contains(&status) {
        return None;
    }
    let field_name = cfg.status_date_fields.get(status)?;
    let recorded = text_values
        .get(item_ref)
        .and_then(|fields| fields.get(field_name))
        .filter(|v| !v.trim().is_empty());
    recorded.is_none().then_some(field_name.as_str())
}

/// Flag terminal items missing their completion timestamp and in-progress
/// items older than the staleness threshold.
///
/// Items with no board reference are skipped. An absent or unparseable
/// start timestamp leaves the staleness check indeterminate, not flagged.
pub fn classify_metrics(
    items: &[WorkItem],
    text_values: &TextFieldValues,
    cfg: &MetricsConfig,
    now: DateTime<Utc>,
) -> Vec<Inconsistency> {
    let mut out = Vec::new();

    for item in items {
        let item_ref = match item.board_item_ref.as_deref() {
            Some(r) => r,
            None => continue,
        };
        let status = match item.board_status.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => continue,
        };

        if COMPLETED_STATUSES.contains(&status) {
            if let Some(field_name) = missing_completion_field(item, text_values, cfg) {
                out.push(Inconsistency {
                    number: item.number,
                    issue_state: item.state,
                    project_status: Some(status.to_string()),
                    severity: Severity::Info,
                    description: format!(
                        "Issue #{} has status '{}' but no '{}' timestamp recorded",
                        item.number, status, field_name
                    ),
                });
            }
        } else if status == IN_PROGRESS_STATUS {
            let field_name = match cfg.status_date_fields.get(status) {
                Some(name) => name,
                None => continue,
            };
            let recorded = text_values
                .get(item_ref)
                .and_then(|fields| fields.get(field_name))
                .filter(|v| !v.trim().is_empty());
            let started = match recorded.and_then(|v| parse_timestamp(v)) {
                Some(ts) => ts,
                None => continue,
            };
            let elapsed_days = (now - started).num_days();
            if elapsed_days > cfg.stale_threshold_days {
                out.push(Inconsistency {
                    number: item.number,
                    issue_state: item.state,
                    project_status: Some(status.to_string()),
                    severity: Severity::Info,
                    description: format!(
                        "Issue #{} has been 'In Progress' for {} days (threshold {})",
                        item.number, elapsed_days, cfg.stale_threshold_days
                    ),
                });
            }
        }
    }

    out
}

/// Parse a free-text timestamp. Accepts RFC 3339 or a bare `YYYY-MM-DD`
/// date (taken as midnight UTC), the two shapes the backfill pass writes.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueState;
    use chrono::Duration;

    fn board_item(number: u64, status: &str) -> WorkItem {
        WorkItem {
            number,
            title: format!("Item {}", number),
            url: format!("https://github.com/acme/widgets/issues/{}", number),
            state: IssueState::Open,
            closed_at: None,
            labels: vec![],
            assignees: vec![],
            board_status: Some(status.to_string()),
            priority: None,
            size: None,
            board_item_ref: Some(format!("PVTI_{}", number)),
            board_ref: Some("PVT_board".to_string()),
        }
    }

    fn values_for(number: u64, field: &str, value: &str) -> TextFieldValues {
        let mut fields = HashMap::new();
        fields.insert(field.to_string(), value.to_string());
        let mut map = HashMap::new();
        map.insert(format!("PVTI_{}", number), fields);
        map
    }

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_done_without_completion_timestamp_is_flagged() {
        let items = vec![board_item(1, "Done"), board_item(2, "Released")];
        let found = classify_metrics(&items, &HashMap::new(), &MetricsConfig::default(), fixed_now());
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|i| i.severity == Severity::Info));
        assert!(found[0].description.contains("'Completed'"));
        assert!(found[0].description.contains("'Done'"));
    }

    #[test]
    fn test_recorded_completion_timestamp_suppresses_flag() {
        let items = vec![board_item(1, "Done")];
        let values = values_for(1, "Completed", "2025-06-01");
        let found = classify_metrics(&items, &values, &MetricsConfig::default(), fixed_now());
        assert!(found.is_empty());
    }

    #[test]
    fn test_whitespace_only_value_counts_as_missing() {
        let items = vec![board_item(1, "Done")];
        let values = values_for(1, "Completed", "   ");
        let found = classify_metrics(&items, &values, &MetricsConfig::default(), fixed_now());
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_stale_in_progress_is_flagged() {
        let now = fixed_now();
        let started = (now - Duration::days(30)).to_rfc3339();
        let items = vec![board_item(5, "In Progress")];
        let values = values_for(5, "Started", &started);
        let found = classify_metrics(&items, &values, &MetricsConfig::default(), now);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Info);
        assert!(found[0].description.contains("30 days"));
        assert!(found[0].description.contains("threshold 14"));
    }

    #[test]
    fn test_fresh_in_progress_is_not_flagged() {
        let now = fixed_now();
        let started = (now - Duration::days(3)).to_rfc3339();
        let items = vec![board_item(5, "In Progress")];
        let values = values_for(5, "Started", &started);
        assert!(classify_metrics(&items, &values, &MetricsConfig::default(), now).is_empty());
    }

    #[test]
    fn test_lower_threshold_flips_borderline_item() {
        let now = fixed_now();
        let started = (now - Duration::days(8)).to_rfc3339();
        let items = vec![board_item(5, "In Progress")];
        let values = values_for(5, "Started", &started);

        let default_cfg = MetricsConfig::default();
        assert!(classify_metrics(&items, &values, &default_cfg, now).is_empty());

        let tight = MetricsConfig {
            stale_threshold_days: 7,
            ..MetricsConfig::default()
        };
        let found = classify_metrics(&items, &values, &tight, now);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_unparseable_start_timestamp_is_indeterminate() {
        let items = vec![board_item(5, "In Progress")];
        let values = values_for(5, "Started", "sometime last sprint");
        assert!(classify_metrics(&items, &values, &MetricsConfig::default(), fixed_now()).is_empty());
    }

    #[test]
    fn test_missing_start_timestamp_is_indeterminate() {
        let items = vec![board_item(5, "In Progress")];
        assert!(classify_metrics(&items, &HashMap::new(), &MetricsConfig::default(), fixed_now()).is_empty());
    }

    #[test]
    fn test_items_off_board_are_skipped() {
        let mut item = board_item(9, "Done");
        item.board_item_ref = None;
        item.board_ref = None;
        assert!(classify_metrics(&[item], &HashMap::new(), &MetricsConfig::default(), fixed_now()).is_empty());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-06-01T10:30:00Z").is_some());
        assert!(parse_timestamp("2025-06-01T10:30:00+02:00").is_some());
        assert!(parse_timestamp("2025-06-01").is_some());
        assert!(parse_timestamp("June 1st").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
