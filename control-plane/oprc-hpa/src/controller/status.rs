use chrono::{DateTime, Utc};

use super::reconcile::HpaSource;
use crate::crd::workload_autoscaler::{
    Condition, ConditionStatus, ConditionType, Phase, Targets,
    WorkloadAutoscalerStatus,
};
use crate::hpa::ReplicaPlan;

/// Builds the status to persist after a pass. Recommendations are carried
/// over untouched; they are owned by the recommender.
pub fn next_status(
    current: Option<&WorkloadAutoscalerStatus>,
    hpa_name: &str,
    source: HpaSource,
    phase: Phase,
    plan: Option<ReplicaPlan>,
    now: DateTime<Utc>,
) -> WorkloadAutoscalerStatus {
    let now_s = now.to_rfc3339();
    let (ready, hpa_reason) = match source {
        HpaSource::Existing => (ConditionStatus::True, "Found"),
        HpaSource::Created => (ConditionStatus::True, "Created"),
        HpaSource::Adopted => (ConditionStatus::True, "Adopted"),
        HpaSource::Deferred => (ConditionStatus::False, "WorkloadScaledToZero"),
    };
    let ready_msg = match source {
        HpaSource::Deferred => {
            format!("hpa {hpa_name} waits for the workload to have replicas")
        }
        _ => format!("managing hpa {hpa_name}"),
    };
    let mut incoming = vec![condition(
        ConditionType::HpaReady,
        ready,
        hpa_reason,
        ready_msg,
    )];
    incoming.push(match plan {
        // Bounds stay out of the message; a decay step must not change
        // the status and retrigger the watch.
        Some(p) => condition(
            ConditionType::RecommendationApplied,
            ConditionStatus::True,
            "Applied",
            format!("recommendations applied in phase {}", p.phase),
        ),
        None if source == HpaSource::Deferred => condition(
            ConditionType::RecommendationApplied,
            ConditionStatus::False,
            "HpaNotCreated",
            "no hpa to apply recommendations to".to_string(),
        ),
        None => condition(
            ConditionType::RecommendationApplied,
            ConditionStatus::False,
            "WaitingForRecommendations",
            format!("phase {phase} does not apply recommendations"),
        ),
    });

    let existing = current.map(|c| c.conditions.as_slice()).unwrap_or(&[]);
    WorkloadAutoscalerStatus {
        phase: plan.map(|p| p.phase).unwrap_or(phase),
        targets: Targets {
            horizontal_pod_autoscaler: (source != HpaSource::Deferred)
                .then(|| hpa_name.to_string()),
        },
        recommendations: current
            .map(|c| c.recommendations.clone())
            .unwrap_or_default(),
        conditions: upsert_conditions(existing, incoming, &now_s),
        last_updated: Some(now_s),
    }
}

fn condition(
    type_: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: String,
) -> Condition {
    Condition {
        type_,
        status,
        reason: Some(reason.into()),
        message: Some(message),
        last_transition_time: None,
    }
}

/// Upserts by condition type. The transition time only moves when the
/// condition's status flips.
fn upsert_conditions(
    existing: &[Condition],
    incoming: Vec<Condition>,
    now: &str,
) -> Vec<Condition> {
    let mut out: Vec<Condition> = existing.to_vec();
    for mut inc in incoming {
        match out.iter().position(|c| c.type_ == inc.type_) {
            Some(idx) => {
                inc.last_transition_time = if out[idx].status == inc.status {
                    out[idx].last_transition_time.clone()
                } else {
                    Some(now.to_string())
                };
                out[idx] = inc;
            }
            None => {
                inc.last_transition_time = Some(now.to_string());
                out.push(inc);
            }
        }
    }
    out.sort_by_key(|c| cond_rank(&c.type_));
    out
}

fn cond_rank(t: &ConditionType) -> u8 {
    match t {
        ConditionType::HpaReady => 0,
        ConditionType::RecommendationApplied => 1,
        ConditionType::Unknown => 250,
    }
}

/// Whether `next` differs from `current` in anything but timestamps.
pub fn status_changed(
    current: Option<&WorkloadAutoscalerStatus>,
    next: &WorkloadAutoscalerStatus,
) -> bool {
    let Some(cur) = current else {
        return true;
    };
    cur.phase != next.phase
        || cur.targets != next.targets
        || cur.conditions != next.conditions
}
