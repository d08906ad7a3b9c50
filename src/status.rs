//! Derives `AgentStatus.phase` and its condition set from the Agent and
//! its observed Deployment (spec §4.4). `Failed` is never derived here
//! — it's written directly by the reconciler's error branches (spec
//! §4.4's closing bullet).

use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

use crate::crd::{AgentPhase, AgentStatus, CONDITION_DEGRADED, CONDITION_READY, ReplicaStatus};

/// What the status engine derived for one pass, before it's merged
/// into the persisted `AgentStatus` (merging is what preserves
/// `lastTransitionTime` across unchanged passes).
pub struct Derived {
    pub phase: AgentPhase,
    pub message: String,
    pub replica_status: ReplicaStatus,
}

pub fn derive(desired_replicas: i32, deployment: Option<&Deployment>) -> Derived {
    let observed = deployment.and_then(|d| d.status.as_ref());
    let ready = observed.and_then(|s| s.ready_replicas).unwrap_or(0);
    let available = observed.and_then(|s| s.available_replicas).unwrap_or(0);

    let replica_status = ReplicaStatus {
        desired: desired_replicas,
        ready,
        available,
    };

    let (phase, message) = if ready == desired_replicas && desired_replicas > 0 {
        (AgentPhase::Running, format!("{ready}/{desired_replicas} replicas ready"))
    } else if ready > 0 {
        (
            AgentPhase::Pending,
            format!("scale-up in progress: {ready}/{desired_replicas} replicas ready"),
        )
    } else {
        (
            AgentPhase::Pending,
            "waiting for Deployment pods to be scheduled".to_string(),
        )
    };

    Derived {
        phase,
        message,
        replica_status,
    }
}

/// Merges a freshly-derived status into the persisted `AgentStatus`,
/// upserting the `Ready` condition and preserving `lastTransitionTime`
/// when a condition's status value doesn't change between passes (spec
/// §4.4).
pub fn apply(status: &mut AgentStatus, derived: Derived) {
    status.phase = Some(derived.phase);
    status.message = Some(derived.message);
    status.replica_status = Some(derived.replica_status);
    status.last_updated = Some(Utc::now().to_rfc3339());

    let ready_condition = Condition {
        type_: CONDITION_READY.to_string(),
        status: if derived.phase == AgentPhase::Running {
            "True".to_string()
        } else {
            "False".to_string()
        },
        reason: if derived.phase == AgentPhase::Running {
            "DeploymentReady".to_string()
        } else {
            "DeploymentNotReady".to_string()
        },
        message: status.message.clone().unwrap_or_default(),
        observed_generation: None,
        last_transition_time: Time(Utc::now()),
    };
    upsert_condition(&mut status.conditions, ready_condition);

    // A successful pass means whatever terminal precondition previously
    // set `Degraded=True` (spec §7) no longer holds — clear it so a
    // recovered Agent (e.g. the missing secret gets created) doesn't
    // stay marked degraded forever (spec §4.4, §8 scenario 4).
    upsert_condition(
        &mut status.conditions,
        Condition {
            type_: CONDITION_DEGRADED.to_string(),
            status: "False".to_string(),
            reason: "Reconciled".to_string(),
            message: "no terminal precondition failures on the last pass".to_string(),
            observed_generation: None,
            last_transition_time: Time(Utc::now()),
        },
    );
}

/// Sets the `Degraded` condition to `True` with `reason`, as driven by
/// the reconciler's terminal-error branches (spec §4.4, §7). Called
/// instead of [`apply`] when a validation or precondition error is
/// terminal for this pass.
pub fn set_degraded(status: &mut AgentStatus, reason: &str, message: &str) {
    status.phase = Some(AgentPhase::Failed);
    status.message = Some(message.to_string());
    status.last_updated = Some(Utc::now().to_rfc3339());

    upsert_condition(
        &mut status.conditions,
        Condition {
            type_: CONDITION_DEGRADED.to_string(),
            status: "True".to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation: None,
            last_transition_time: Time(Utc::now()),
        },
    );
    upsert_condition(
        &mut status.conditions,
        Condition {
            type_: CONDITION_READY.to_string(),
            status: "False".to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation: None,
            last_transition_time: Time(Utc::now()),
        },
    );
}

/// Inserts `new` by `type_`, replacing any existing condition of that
/// type but keeping `lastTransitionTime` from the prior value when the
/// `status` field (True/False/Unknown) is unchanged (spec §4.4).
fn upsert_condition(conditions: &mut Vec<Condition>, new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == new.type_) {
        let transition_time = if existing.status == new.status {
            existing.last_transition_time.clone()
        } else {
            new.last_transition_time.clone()
        };
        *existing = Condition {
            last_transition_time: transition_time,
            ..new
        };
    } else {
        conditions.push(new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentStatus;

    fn deployment_with(ready: i32, available: i32) -> Deployment {
        Deployment {
            status: Some(DeploymentStatus {
                ready_replicas: Some(ready),
                available_replicas: Some(available),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn running_when_ready_equals_desired_and_positive() {
        let derived = derive(3, Some(&deployment_with(3, 3)));
        assert_eq!(derived.phase, AgentPhase::Running);
    }

    #[test]
    fn pending_when_not_yet_scheduled() {
        let derived = derive(3, None);
        assert_eq!(derived.phase, AgentPhase::Pending);
        assert_eq!(derived.replica_status.ready, 0);
    }

    #[test]
    fn pending_when_scaling_up() {
        let derived = derive(3, Some(&deployment_with(1, 1)));
        assert_eq!(derived.phase, AgentPhase::Pending);
    }

    #[test]
    fn condition_transition_time_preserved_when_status_unchanged() {
        let mut status = AgentStatus::default();
        apply(&mut status, derive(1, Some(&deployment_with(1, 1))));
        let first_time = status
            .conditions
            .iter()
            .find(|c| c.type_ == CONDITION_READY)
            .unwrap()
            .last_transition_time
            .clone();

        apply(&mut status, derive(1, Some(&deployment_with(1, 1))));
        let second_time = status
            .conditions
            .iter()
            .find(|c| c.type_ == CONDITION_READY)
            .unwrap()
            .last_transition_time
            .clone();

        assert_eq!(first_time.0, second_time.0);
    }

    #[test]
    fn set_degraded_marks_ready_false_and_degraded_true() {
        let mut status = AgentStatus::default();
        set_degraded(&mut status, "MissingSecret", "secret \"s\" not found");
        assert_eq!(status.phase, Some(AgentPhase::Failed));
        let ready = status
            .conditions
            .iter()
            .find(|c| c.type_ == CONDITION_READY)
            .unwrap();
        assert_eq!(ready.status, "False");
        let degraded = status
            .conditions
            .iter()
            .find(|c| c.type_ == CONDITION_DEGRADED)
            .unwrap();
        assert_eq!(degraded.status, "True");
    }

    #[test]
    fn apply_clears_degraded_after_recovery() {
        let mut status = AgentStatus::default();
        set_degraded(&mut status, "MissingSecret", "secret \"s\" not found");

        apply(&mut status, derive(1, Some(&deployment_with(1, 1))));

        let degraded = status
            .conditions
            .iter()
            .find(|c| c.type_ == CONDITION_DEGRADED)
            .unwrap();
        assert_eq!(degraded.status, "False");
        assert_eq!(status.phase, Some(AgentPhase::Running));
    }
}
