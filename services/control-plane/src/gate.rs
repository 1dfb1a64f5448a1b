//! Gate state machine: the only sanctioned mutator of a record's status.
//!
//! `apply_status` performs no legality checks itself; callers enforce the
//! transition policy with the guards below before invoking it, and hold the
//! record's per-key lock for the duration of the call (see `state.rs`).

use chrono::Utc;

use crate::error::GateError;
use crate::types::{DatasetVersion, L1Report, Status, StatusHistoryItem, StatusSource};

/// Unconditionally set status + source and append a history entry.
///
/// History timestamps never go backwards relative to the previous entry,
/// so the append-only trail stays ordered even across clock adjustments.
pub fn apply_status(
    record: &mut DatasetVersion,
    status: Status,
    source: StatusSource,
    reason: Option<String>,
) {
    let now = Utc::now();
    let timestamp = match record.status_history.last() {
        Some(last) if last.timestamp > now => last.timestamp,
        _ => now,
    };

    record.status = status;
    record.status_source = source;
    record.status_history.push(StatusHistoryItem {
        status,
        source,
        timestamp,
        reason,
    });
}

/// L1 is a hard binary gate: anything that is not an explicit PASS is
/// applied as BLOCK, whatever the raw report claims.
pub fn l1_target_status(report: &L1Report) -> Status {
    match report.l1_status {
        Status::Pass => Status::Pass,
        _ => Status::Block,
    }
}

pub fn is_l1_blocked(record: &DatasetVersion) -> bool {
    record.status == Status::Block && record.status_source == StatusSource::L1
}

/// An L1 BLOCK is final: no L2 audit result may change it.
pub fn ensure_l2_allowed(record: &DatasetVersion) -> Result<(), GateError> {
    if is_l1_blocked(record) {
        return Err(GateError::IllegalTransition(format!(
            "{}:{} is blocked by L1 rules; L2 result rejected",
            record.dataset_id, record.version
        )));
    }
    Ok(())
}

/// Manual transitions may set any status except overriding an L1 BLOCK.
pub fn ensure_manual_allowed(record: &DatasetVersion) -> Result<(), GateError> {
    if is_l1_blocked(record) {
        return Err(GateError::IllegalTransition(format!(
            "{}:{} is blocked by L1 rules; manual override rejected",
            record.dataset_id, record.version
        )));
    }
    Ok(())
}
