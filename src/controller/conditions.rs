//! Status merging: conditions and per-workload entries

use chrono::{DateTime, Utc};

use crate::crd::{Condition, WorkloadStatus};

/// Insert or replace the condition with the same type, stamping now
///
/// See [`upsert_condition_at`].
pub fn upsert_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    upsert_condition_at(conditions, condition, Utc::now());
}

/// Insert or replace the condition with the same type
///
/// The existing `last_transition_time` is kept when the status did not
/// change and a timestamp is already present; otherwise `now` is stamped.
/// New types are appended.
pub fn upsert_condition_at(
    conditions: &mut Vec<Condition>,
    mut condition: Condition,
    now: DateTime<Utc>,
) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            condition.last_transition_time = match existing.last_transition_time {
                Some(ts) if existing.status == condition.status => Some(ts),
                _ => Some(now),
            };
            *existing = condition;
        }
        None => {
            condition.last_transition_time = Some(now);
            conditions.push(condition);
        }
    }
}

/// Replace the entry for the same workload, or append
pub fn upsert_workload_status(statuses: &mut Vec<WorkloadStatus>, status: WorkloadStatus) {
    match statuses.iter_mut().find(|s| s.same_workload(&status)) {
        Some(existing) => *existing = status,
        None => statuses.push(status),
    }
}
