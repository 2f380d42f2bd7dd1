use crate::crd::{Condition, ConditionType, ValhallaStatus};

/// Upsert `incoming` into `conditions` by type. When the status of an
/// existing entry is unchanged its `lastTransitionTime` is carried over,
/// otherwise the incoming timestamp is kept.
pub fn set_condition(conditions: &mut Vec<Condition>, mut incoming: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == incoming.type_) {
        Some(existing) => {
            if existing.status == incoming.status {
                incoming.last_transition_time =
                    existing.last_transition_time.clone();
            }
            *existing = incoming;
        }
        None => conditions.push(incoming),
    }
    conditions.sort_by_key(|c| cond_rank(c.type_));
}

fn cond_rank(t: ConditionType) -> u8 {
    match t {
        ConditionType::Available => 0,
        ConditionType::AllReplicasReady => 1,
        ConditionType::ReconciliationSuccess => 2,
    }
}

/// Whether writing `desired` would change anything material compared to
/// `current`. Timestamps only move on transitions, so equal statuses are
/// skipped entirely.
pub fn should_patch_status(
    current: Option<&ValhallaStatus>,
    desired: &ValhallaStatus,
) -> bool {
    match current {
        Some(cur) => normalize_status(cur) != normalize_status(desired),
        None => true,
    }
}

fn normalize_status(s: &ValhallaStatus) -> ValhallaStatus {
    let mut s = s.clone();
    s.conditions.sort_by_key(|c| cond_rank(c.type_));
    s
}
