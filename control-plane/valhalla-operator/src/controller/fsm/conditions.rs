use chrono::{DateTime, SecondsFormat, Utc};

use super::observed::ChildSnapshot;
use crate::controller::status_reducer::set_condition;
use crate::crd::{Condition, ConditionStatus, ConditionType};

pub const REASON_INITIALISING: &str = "Initialising";
pub const REASON_SUCCESS: &str = "Success";
pub const REASON_ERROR: &str = "Error";
pub const REASON_CLEANUP: &str = "Cleanup";

const NO_DEPLOYMENT: &str = "serving deployment does not exist yet";

/// Result of the latest apply sequence as recorded in
/// `ReconciliationSuccess`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyReport {
    /// No apply ran in this pass; keep whatever was recorded before.
    Unchanged,
    Succeeded,
    Failed(String),
}

/// Candidate value of one condition before timestamps are resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Candidate {
    status: ConditionStatus,
    reason: String,
    message: Option<String>,
}

fn available(snapshot: &ChildSnapshot) -> Candidate {
    let sub = snapshot
        .deployment()
        .and_then(|d| d.status.as_ref())
        .and_then(|s| s.conditions.as_ref())
        .and_then(|cs| cs.iter().find(|c| c.type_ == "Available"));
    match (snapshot.deployment(), sub) {
        (None, _) => Candidate {
            status: ConditionStatus::False,
            reason: "DeploymentNotFound".into(),
            message: Some(NO_DEPLOYMENT.into()),
        },
        (Some(_), Some(c)) if c.status == "True" => Candidate {
            status: ConditionStatus::True,
            reason: c.reason.clone().unwrap_or_else(|| "Available".into()),
            message: c.message.clone(),
        },
        (Some(_), c) => Candidate {
            status: ConditionStatus::False,
            reason: c
                .and_then(|c| c.reason.clone())
                .unwrap_or_else(|| "Unavailable".into()),
            message: c.and_then(|c| c.message.clone()),
        },
    }
}

fn all_replicas_ready(snapshot: &ChildSnapshot) -> Candidate {
    let Some(deploy) = snapshot.deployment() else {
        return Candidate {
            status: ConditionStatus::False,
            reason: "NotAllReplicasReady".into(),
            message: Some(NO_DEPLOYMENT.into()),
        };
    };
    let desired = deploy.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let ready = deploy
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    let status = ConditionStatus::from(ready >= desired);
    Candidate {
        reason: if ready >= desired {
            "AllReplicasReady".into()
        } else {
            "NotAllReplicasReady".into()
        },
        status,
        message: Some(format!("{ready}/{desired} replicas ready")),
    }
}

fn reconciliation(previous: &[Condition], report: &ApplyReport) -> Candidate {
    match report {
        ApplyReport::Succeeded => Candidate {
            status: ConditionStatus::True,
            reason: REASON_SUCCESS.into(),
            message: None,
        },
        ApplyReport::Failed(err) => Candidate {
            status: ConditionStatus::False,
            reason: REASON_ERROR.into(),
            message: Some(err.clone()),
        },
        ApplyReport::Unchanged => previous
            .iter()
            .find(|c| c.type_ == ConditionType::ReconciliationSuccess)
            .map(|c| Candidate {
                status: c.status,
                reason: c.reason.clone().unwrap_or_default(),
                message: c.message.clone(),
            })
            .unwrap_or_else(|| Candidate {
                status: ConditionStatus::Unknown,
                reason: REASON_INITIALISING.into(),
                message: None,
            }),
    }
}

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Compute the full tracked condition set from the snapshot and the
/// previous conditions. Transition times move only when a status flips.
pub fn aggregate(
    previous: &[Condition],
    snapshot: &ChildSnapshot,
    report: &ApplyReport,
    now: DateTime<Utc>,
) -> Vec<Condition> {
    let at = timestamp(now);
    let mut out = previous.to_vec();
    for type_ in ConditionType::ALL {
        let c = match type_ {
            ConditionType::Available => available(snapshot),
            ConditionType::AllReplicasReady => all_replicas_ready(snapshot),
            ConditionType::ReconciliationSuccess => {
                reconciliation(previous, report)
            }
        };
        set_condition(&mut out, Condition {
            type_,
            status: c.status,
            reason: Some(c.reason),
            message: c.message,
            last_transition_time: Some(at.clone()),
        });
    }
    out
}

/// `Available=False` with reason `Cleanup`, set when deletion starts.
pub fn cleanup_condition(now: DateTime<Utc>) -> Condition {
    Condition {
        type_: ConditionType::Available,
        status: ConditionStatus::False,
        reason: Some(REASON_CLEANUP.into()),
        message: Some("Deleting Valhalla resources".into()),
        last_transition_time: Some(timestamp(now)),
    }
}
