use chrono::{DateTime, Datelike, TimeZone, Timelike};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;

use super::window;
use crate::crd::workload_autoscaler::{
    HorizontalRecommendations, Phase, ReplicasRecommendation,
};
use crate::error::HpaError;

/// Kubernetes applies this when an autoscaler omits `minReplicas`.
pub const DEFAULT_MIN_REPLICAS: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaPlan {
    pub min: i32,
    pub max: i32,
    pub phase: Phase,
}

pub struct PlanInput<'a, Tz: TimeZone> {
    /// `minReplicas` currently set on the live autoscaler
    pub current_min: i32,
    pub recommendations: &'a HorizontalRecommendations,
    pub phase: Phase,
    pub reduction_factor: f64,
    pub now: &'a DateTime<Tz>,
}

/// Computes the replica bounds for this pass and the phase to persist.
///
/// * `Emergency` pins `min` to the recommended `max`.
/// * `BackToNormal` shrinks the live `min` by the reduction factor each
///   pass until the shrunk value would drop below the recommended `min`;
///   at that point the recommended `min` is used and the phase becomes
///   `Working`.
/// * Any other phase uses the recommended bounds as they are.
///
/// A missing time-window slot fails the whole plan.
pub fn plan<Tz: TimeZone>(
    input: PlanInput<'_, Tz>,
) -> Result<ReplicaPlan, HpaError> {
    let recs = input.recommendations;
    let max = lookup(&recs.max_replicas, input.now, "maxReplicas")?;

    let (min, phase) = match input.phase {
        Phase::Emergency => (max, Phase::Emergency),
        Phase::BackToNormal => {
            let ideal = lookup(&recs.min_replicas, input.now, "minReplicas")?;
            let reduced = decay(input.current_min, input.reduction_factor);
            if ideal > reduced {
                (ideal, Phase::Working)
            } else {
                (reduced, Phase::BackToNormal)
            }
        }
        Phase::Initializing | Phase::GatheringData | Phase::Working => {
            let min = lookup(&recs.min_replicas, input.now, "minReplicas")?;
            (min, input.phase)
        }
    };

    Ok(ReplicaPlan { min, max, phase })
}

/// Plans against the live autoscaler, reading its current `minReplicas`.
pub fn plan_replicas<Tz: TimeZone>(
    hpa: &HorizontalPodAutoscaler,
    recommendations: &HorizontalRecommendations,
    phase: Phase,
    reduction_factor: f64,
    now: &DateTime<Tz>,
) -> Result<ReplicaPlan, HpaError> {
    plan(PlanInput {
        current_min: live_min_replicas(hpa),
        recommendations,
        phase,
        reduction_factor,
        now,
    })
}

pub fn live_min_replicas(hpa: &HorizontalPodAutoscaler) -> i32 {
    hpa.spec
        .as_ref()
        .and_then(|s| s.min_replicas)
        .unwrap_or(DEFAULT_MIN_REPLICAS)
}

/// Writes the planned bounds onto the autoscaler.
pub fn apply_plan(hpa: &mut HorizontalPodAutoscaler, plan: &ReplicaPlan) {
    let spec = hpa.spec.get_or_insert_with(Default::default);
    spec.max_replicas = plan.max;
    spec.min_replicas = Some(plan.min);
}

/// `floor(current_min * factor)`, truncated toward zero.
pub fn decay(current_min: i32, factor: f64) -> i32 {
    (f64::from(current_min) * factor).trunc() as i32
}

fn lookup<Tz: TimeZone>(
    slots: &[ReplicasRecommendation],
    now: &DateTime<Tz>,
    bound: &'static str,
) -> Result<i32, HpaError> {
    window::lookup(slots, now).ok_or_else(|| HpaError::RecommendationGap {
        bound,
        weekday: now.weekday(),
        hour: now.hour(),
    })
}
