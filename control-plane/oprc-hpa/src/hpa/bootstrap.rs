use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HPAScalingPolicy, HPAScalingRules,
    HorizontalPodAutoscaler, HorizontalPodAutoscalerBehavior,
    HorizontalPodAutoscalerSpec, MetricSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};

use super::metrics::external_metric;
use super::naming::{ResourceKind, external_metric_name, prefix_annotations};
use crate::config::CoreConfig;
use crate::crd::workload_autoscaler::{AutoscalingPolicy, WorkloadAutoscaler};
use crate::error::HpaError;

const PERCENT_POLICY: &str = "Percent";

/// Scale up fast: replicas may double every minute.
const SCALE_UP_PERCENT: i32 = 100;
const SCALE_UP_PERIOD_SECS: i32 = 60;
/// Scale down slowly: at most 2% of replicas every 90 seconds.
const SCALE_DOWN_PERCENT: i32 = 2;
const SCALE_DOWN_PERIOD_SECS: i32 = 90;

/// Initial replica bracket around the observed replica count.
pub fn initial_bounds(current_replicas: i32) -> (i32, i32) {
    let current = current_replicas.max(0);
    ((current + 1) / 2, current.saturating_mul(2))
}

pub fn default_behavior() -> HorizontalPodAutoscalerBehavior {
    HorizontalPodAutoscalerBehavior {
        scale_up: Some(percent_rule(SCALE_UP_PERCENT, SCALE_UP_PERIOD_SECS)),
        scale_down: Some(percent_rule(
            SCALE_DOWN_PERCENT,
            SCALE_DOWN_PERIOD_SECS,
        )),
    }
}

fn percent_rule(value: i32, period_seconds: i32) -> HPAScalingRules {
    HPAScalingRules {
        policies: Some(vec![HPAScalingPolicy {
            type_: PERCENT_POLICY.into(),
            value,
            period_seconds,
        }]),
        ..Default::default()
    }
}

/// Builds the autoscaler this controller creates for `wa` when none
/// exists yet.
///
/// Every horizontally scaled (container, resource) pair gets an external
/// metric whose name comes from the prefix annotations written onto the
/// same object, so later rewrites can find it again.
pub fn build_hpa(
    wa: &WorkloadAutoscaler,
    current_replicas: i32,
    cfg: &CoreConfig,
) -> Result<HorizontalPodAutoscaler, HpaError> {
    let ns = wa
        .namespace()
        .ok_or(HpaError::MissingWorkloadField("metadata.namespace"))?;
    let deployment = &wa.spec.target_refs.deployment_name;
    if deployment.is_empty() {
        return Err(HpaError::MissingWorkloadField(
            "spec.target_refs.deployment_name",
        ));
    }
    let (min, max) = initial_bounds(current_replicas);

    let mut hpa = HorizontalPodAutoscaler {
        metadata: ObjectMeta {
            name: Some(wa.hpa_name()),
            namespace: Some(ns.clone()),
            annotations: Some(prefix_annotations(
                &cfg.external_metric_provider,
                &ns,
                deployment,
            )),
            owner_references: wa.controller_owner_ref(&()).map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".into()),
                kind: "Deployment".into(),
                name: deployment.clone(),
            },
            min_replicas: Some(min),
            max_replicas: max,
            behavior: Some(default_behavior()),
            metrics: None,
        }),
        status: None,
    };

    let metrics = initial_metrics(&hpa, wa, cfg)?;
    if let Some(spec) = hpa.spec.as_mut() {
        spec.metrics = Some(metrics);
    }
    Ok(hpa)
}

fn initial_metrics(
    hpa: &HorizontalPodAutoscaler,
    wa: &WorkloadAutoscaler,
    cfg: &CoreConfig,
) -> Result<Vec<MetricSpec>, HpaError> {
    let annotations = hpa.annotations();
    let mut metrics = Vec::new();
    for policy in &wa.spec.resource_policy {
        for (resource, mode) in &policy.autoscaling_policy {
            if !mode.scales_horizontally() {
                continue;
            }
            let target = match mode {
                AutoscalingPolicy::Mixed => cfg.mixed_target_pct,
                _ => cfg.horizontal_target_pct,
            };
            let kind: ResourceKind = resource.parse()?;
            let name =
                external_metric_name(annotations, kind, &policy.container_name)?;
            metrics.push(external_metric(name, target));
        }
    }
    Ok(metrics)
}
