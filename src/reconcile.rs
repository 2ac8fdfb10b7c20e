//! Corrective actions for detected drift
//!
//! Consumes the classifier output and the API's mutation capability.
//! Failure isolation is the contract here: one item's fix failure never
//! aborts the rest; every attempt is recorded as a [`FixResult`] and the
//! summary accounts failures separately. Board field definitions are
//! fetched once per board for the whole run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::github::{BoardApi, BoardFields, CloseReason};
use crate::metrics::{missing_completion_field, MetricsConfig, TextFieldValues};
use crate::model::{FixAction, FixResult, Inconsistency, IssueState, Severity, WorkItem};

const STATUS_FIELD: &str = "Status";
const DONE_STATUS: &str = "Done";

/// Per-run memo of board field definitions, keyed by board ref.
///
/// Owned by one reconciliation run rather than shared process-wide, so
/// parallel runs never observe each other's state.
#[derive(Default)]
pub struct BoardFieldCache {
    fields: HashMap<String, BoardFields>,
}

impl BoardFieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get<A: BoardApi>(&mut self, api: &A, board_ref: &str) -> anyhow::Result<&BoardFields> {
        if !self.fields.contains_key(board_ref) {
            let fetched = api.board_fields(board_ref).await?;
            debug!(board_ref, "cached board field definitions");
            self.fields.insert(board_ref.to_string(), fetched);
        }
        self.fields
            .get(board_ref)
            .ok_or_else(|| anyhow::anyhow!("board fields missing from cache"))
    }
}

/// Apply corrective actions to every error-severity inconsistency.
/// Info-severity findings are never auto-fixed.
///
/// An OPEN issue parked in a terminal column gets closed; a CLOSED issue
/// stuck in a work-started column gets its status moved to the terminal
/// "Done" option. Fixes run in classification order and each failure is
/// recorded, not raised.
pub async fn apply_fixes<A: BoardApi>(
    api: &A,
    items: &[WorkItem],
    inconsistencies: &[Inconsistency],
    cache: &mut BoardFieldCache,
) -> Vec<FixResult> {
    let by_number: HashMap<u64, &WorkItem> = items.iter().map(|i| (i.number, i)).collect();

    let mut results = Vec::new();
    for inconsistency in inconsistencies {
        if inconsistency.severity != Severity::Error {
            continue;
        }
        let result = match inconsistency.issue_state {
            IssueState::Open => close_issue_fix(api, inconsistency).await,
            IssueState::Closed => {
                let item = by_number.get(&inconsistency.number).copied();
                update_status_fix(api, item, inconsistency, cache).await
            }
        };
        results.push(result);
    }
    results
}

async fn close_issue_fix<A: BoardApi>(api: &A, inconsistency: &Inconsistency) -> FixResult {
    let number = inconsistency.number;
    let issue_id = match api.issue_id(number).await {
        Ok(id) => id,
        Err(err) => {
            return FixResult::failed(
                number,
                FixAction::Close,
                format!("could not resolve issue id: {}", err),
            )
        }
    };
    match api.close_issue(&issue_id, CloseReason::Completed).await {
        Ok(()) => FixResult::ok(number, FixAction::Close),
        Err(err) => FixResult::failed(number, FixAction::Close, err.to_string()),
    }
}

async fn update_status_fix<A: BoardApi>(
    api: &A,
    item: Option<&WorkItem>,
    inconsistency: &Inconsistency,
    cache: &mut BoardFieldCache,
) -> FixResult {
    let number = inconsistency.number;
    let Some(item) = item else {
        return FixResult::failed(
            number,
            FixAction::UpdateStatus,
            "work item not present in the fetched snapshot",
        );
    };
    let (Some(board_ref), Some(item_ref)) = (item.board_ref.as_deref(), item.board_item_ref.as_deref())
    else {
        return FixResult::failed(number, FixAction::UpdateStatus, "item has no board reference");
    };

    let fields = match cache.get(api, board_ref).await {
        Ok(fields) => fields,
        Err(err) => {
            return FixResult::failed(
                number,
                FixAction::UpdateStatus,
                format!("failed to fetch board fields: {}", err),
            )
        }
    };
    let Some(status_field) = fields.field(STATUS_FIELD) else {
        return FixResult::failed(
            number,
            FixAction::UpdateStatus,
            format!("board has no '{}' field", STATUS_FIELD),
        );
    };
    let Some(option_id) = status_field.option_id(DONE_STATUS) else {
        return FixResult::failed(
            number,
            FixAction::UpdateStatus,
            format!("status field has no '{}' option", DONE_STATUS),
        );
    };

    match api
        .set_select_field(board_ref, item_ref, &status_field.id, option_id)
        .await
    {
        Ok(()) => FixResult::ok(number, FixAction::UpdateStatus),
        Err(err) => FixResult::failed(number, FixAction::UpdateStatus, err.to_string()),
    }
}

/// Backfill completion timestamps for terminal items that never recorded
/// one: the issue's close timestamp if known, otherwise `now`.
pub async fn backfill_timestamps<A: BoardApi>(
    api: &A,
    items: &[WorkItem],
    text_values: &TextFieldValues,
    cfg: &MetricsConfig,
    cache: &mut BoardFieldCache,
    now: DateTime<Utc>,
) -> Vec<FixResult> {
    let mut results = Vec::new();

    for item in items {
        let Some(field_name) = missing_completion_field(item, text_values, cfg) else {
            continue;
        };
        let (Some(board_ref), Some(item_ref)) =
            (item.board_ref.as_deref(), item.board_item_ref.as_deref())
        else {
            continue;
        };

        let fields = match cache.get(api, board_ref).await {
            Ok(fields) => fields,
            Err(err) => {
                results.push(FixResult::failed(
                    item.number,
                    FixAction::BackfillTimestamp,
                    format!("failed to fetch board fields: {}", err),
                ));
                continue;
            }
        };
        let Some(field) = fields.field(field_name) else {
            results.push(FixResult::failed(
                item.number,
                FixAction::BackfillTimestamp,
                format!("board has no '{}' field", field_name),
            ));
            continue;
        };
        let field_id = field.id.clone();

        let value = item.closed_at.unwrap_or(now).to_rfc3339();
        match api.set_text_field(board_ref, item_ref, &field_id, &value).await {
            Ok(()) => results.push(FixResult::ok(item.number, FixAction::BackfillTimestamp)),
            Err(err) => results.push(FixResult::failed(
                item.number,
                FixAction::BackfillTimestamp,
                err.to_string(),
            )),
        }
    }

    results
}
