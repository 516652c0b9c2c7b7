use k8s_openapi::api::autoscaling::v2::{
    ContainerResourceMetricSource, ExternalMetricSource,
    HorizontalPodAutoscaler, MetricIdentifier, MetricSpec, MetricTarget,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::{error, trace};

use super::naming::{ResourceKind, external_metric_name};
use crate::crd::workload_autoscaler::ContainerTargetUtilization;
use crate::error::{HpaError, NamingError};

pub const CONTAINER_RESOURCE_METRIC: &str = "ContainerResource";
pub const EXTERNAL_METRIC: &str = "External";
pub const VALUE_TARGET: &str = "Value";
pub const UTILIZATION_TARGET: &str = "Utilization";

/// The metric kinds this controller rewrites. Anything else in the
/// autoscaler is left alone.
enum MetricEntry<'a> {
    ContainerResource(&'a mut ContainerResourceMetricSource),
    External(&'a mut ExternalMetricSource),
    /// `type` names a kind whose source block is absent
    Malformed(&'static str),
    Other,
}

fn classify(m: &mut MetricSpec) -> MetricEntry<'_> {
    match m.type_.as_str() {
        CONTAINER_RESOURCE_METRIC => match m.container_resource.as_mut() {
            Some(c) => MetricEntry::ContainerResource(c),
            None => MetricEntry::Malformed(CONTAINER_RESOURCE_METRIC),
        },
        EXTERNAL_METRIC => match m.external.as_mut() {
            Some(e) => MetricEntry::External(e),
            None => MetricEntry::Malformed(EXTERNAL_METRIC),
        },
        _ => MetricEntry::Other,
    }
}

pub fn external_metric(name: String, value: i32) -> MetricSpec {
    MetricSpec {
        type_: EXTERNAL_METRIC.into(),
        external: Some(ExternalMetricSource {
            metric: MetricIdentifier {
                name,
                selector: None,
            },
            target: MetricTarget {
                type_: VALUE_TARGET.into(),
                value: Some(Quantity(value.to_string())),
                ..Default::default()
            },
        }),
        ..Default::default()
    }
}

/// Overwrites the target of every metric that tracks `kind` of
/// `container`, in place.
///
/// Container resource metrics are matched by container and resource name
/// and only rewritten when their target is utilization based. External
/// metrics are matched by the name derived from the prefix annotation, so
/// the autoscaler must carry one for `kind`. Finding no matching metric is
/// fine; the recommendation may cover a container this autoscaler does not
/// track.
pub fn rewrite_target(
    hpa: &mut HorizontalPodAutoscaler,
    container: &str,
    kind: ResourceKind,
    target: i32,
) -> Result<(), NamingError> {
    let external_name = external_metric_name(
        hpa.metadata.annotations.as_ref().unwrap_or(&Default::default()),
        kind,
        container,
    )?;
    let hpa_name = hpa.metadata.name.clone().unwrap_or_default();
    let Some(metrics) = hpa.spec.as_mut().and_then(|s| s.metrics.as_mut())
    else {
        trace!(hpa = %hpa_name, "no metrics to rewrite");
        return Ok(());
    };

    for m in metrics.iter_mut() {
        match classify(m) {
            MetricEntry::ContainerResource(c) => {
                if c.container != container || c.name != kind.as_str() {
                    continue;
                }
                if c.target.average_utilization.is_none() {
                    continue;
                }
                c.target.average_utilization = Some(target);
            }
            MetricEntry::External(e) => {
                if e.metric.name != external_name {
                    continue;
                }
                if e.target.value.is_none() {
                    error!(hpa = %hpa_name, metric = %external_name, "external metric target has no value");
                    continue;
                }
                e.target.value = Some(Quantity(target.to_string()));
            }
            MetricEntry::Malformed(metric_type) => {
                error!(hpa = %hpa_name, %metric_type, "invalid metric: source block missing");
            }
            MetricEntry::Other => {}
        }
    }
    Ok(())
}

/// Applies every per-container target utilization recommendation.
pub fn rewrite_metrics(
    hpa: &mut HorizontalPodAutoscaler,
    recommendations: &[ContainerTargetUtilization],
) -> Result<(), HpaError> {
    for rec in recommendations {
        for (resource, target) in &rec.target_utilization {
            let kind: ResourceKind = resource.parse()?;
            rewrite_target(hpa, &rec.container_name, kind, *target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hpa::naming::{
        CPU_METRIC_PREFIX_ANNOTATION, MEMORY_METRIC_PREFIX_ANNOTATION,
        prefix_annotations,
    };
    use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscalerSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn container_resource_metric(
        container: &str,
        kind: ResourceKind,
        utilization: i32,
    ) -> MetricSpec {
        MetricSpec {
            type_: CONTAINER_RESOURCE_METRIC.into(),
            container_resource: Some(ContainerResourceMetricSource {
                container: container.into(),
                name: kind.as_str().into(),
                target: MetricTarget {
                    type_: UTILIZATION_TARGET.into(),
                    average_utilization: Some(utilization),
                    ..Default::default()
                },
            }),
            ..Default::default()
        }
    }

    fn hpa_with(metrics: Vec<MetricSpec>) -> HorizontalPodAutoscaler {
        HorizontalPodAutoscaler {
            metadata: ObjectMeta {
                name: Some("checkout-hpa".into()),
                namespace: Some("shop".into()),
                annotations: Some(prefix_annotations(
                    "datadogmetric",
                    "shop",
                    "checkout",
                )),
                ..Default::default()
            },
            spec: Some(HorizontalPodAutoscalerSpec {
                max_replicas: 10,
                min_replicas: Some(2),
                metrics: Some(metrics),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn ext(name: &str, value: i32) -> MetricSpec {
        external_metric(name.to_string(), value)
    }

    fn utilizations(hpa: &HorizontalPodAutoscaler) -> Vec<Option<i32>> {
        metrics(hpa)
            .iter()
            .map(|m| {
                m.container_resource
                    .as_ref()
                    .and_then(|c| c.target.average_utilization)
            })
            .collect()
    }

    fn values(hpa: &HorizontalPodAutoscaler) -> Vec<Option<String>> {
        metrics(hpa)
            .iter()
            .map(|m| {
                m.external
                    .as_ref()
                    .and_then(|e| e.target.value.as_ref())
                    .map(|q| q.0.clone())
            })
            .collect()
    }

    fn metrics(hpa: &HorizontalPodAutoscaler) -> &Vec<MetricSpec> {
        hpa.spec.as_ref().unwrap().metrics.as_ref().unwrap()
    }

    #[test]
    fn rewrites_only_the_matching_container_and_resource() {
        let mut hpa = hpa_with(vec![
            container_resource_metric("api", ResourceKind::Cpu, 50),
            container_resource_metric("worker", ResourceKind::Cpu, 50),
            container_resource_metric("api", ResourceKind::Memory, 50),
        ]);
        rewrite_target(&mut hpa, "api", ResourceKind::Cpu, 80).unwrap();
        assert_eq!(utilizations(&hpa), vec![Some(80), Some(50), Some(50)]);
    }

    #[test]
    fn rewrites_external_metric_by_derived_name() {
        let mut hpa = hpa_with(vec![
            ext("datadogmetric@shop:checkout-cpu-api", 50),
            ext("datadogmetric@shop:checkout-cpu-worker", 50),
            ext("datadogmetric@shop:checkout-memory-api", 90),
        ]);
        rewrite_target(&mut hpa, "api", ResourceKind::Cpu, 75).unwrap();
        assert_eq!(
            values(&hpa),
            vec![Some("75".into()), Some("50".into()), Some("90".into())]
        );
    }

    #[test]
    fn non_utilization_container_target_is_untouched() {
        let mut avg_value =
            container_resource_metric("api", ResourceKind::Cpu, 0);
        let target =
            &mut avg_value.container_resource.as_mut().unwrap().target;
        target.type_ = "AverageValue".into();
        target.average_utilization = None;
        target.average_value = Some(Quantity("500m".into()));
        let mut hpa = hpa_with(vec![avg_value.clone()]);

        rewrite_target(&mut hpa, "api", ResourceKind::Cpu, 70).unwrap();
        assert_eq!(metrics(&hpa)[0], avg_value);
    }

    #[test]
    fn missing_prefix_fails_without_touching_metrics() {
        let mut hpa = hpa_with(vec![container_resource_metric(
            "api",
            ResourceKind::Memory,
            50,
        )]);
        hpa.metadata
            .annotations
            .as_mut()
            .unwrap()
            .remove(MEMORY_METRIC_PREFIX_ANNOTATION);
        let before = hpa.clone();

        let err = rewrite_target(&mut hpa, "api", ResourceKind::Memory, 70)
            .unwrap_err();
        assert_eq!(
            err,
            NamingError::MissingPrefix {
                annotation: MEMORY_METRIC_PREFIX_ANNOTATION
            }
        );
        assert_eq!(hpa, before);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let broken_container = MetricSpec {
            type_: CONTAINER_RESOURCE_METRIC.into(),
            ..Default::default()
        };
        let broken_external = MetricSpec {
            type_: EXTERNAL_METRIC.into(),
            ..Default::default()
        };
        let mut hpa = hpa_with(vec![
            broken_container,
            broken_external,
            container_resource_metric("api", ResourceKind::Cpu, 50),
            ext("datadogmetric@shop:checkout-cpu-api", 50),
        ]);
        rewrite_target(&mut hpa, "api", ResourceKind::Cpu, 65).unwrap();
        assert_eq!(utilizations(&hpa)[2], Some(65));
        assert_eq!(values(&hpa)[3], Some("65".into()));
    }

    #[test]
    fn no_match_is_not_an_error() {
        let mut hpa =
            hpa_with(vec![ext("datadogmetric@shop:checkout-cpu-api", 50)]);
        let before = hpa.clone();
        rewrite_target(&mut hpa, "sidecar", ResourceKind::Cpu, 40).unwrap();
        assert_eq!(hpa, before);
    }

    #[test]
    fn rewriting_twice_equals_rewriting_once() {
        let recs = vec![ContainerTargetUtilization {
            container_name: "api".into(),
            target_utilization: BTreeMap::from([
                ("cpu".to_string(), 72),
                ("memory".to_string(), 81),
            ]),
        }];
        let mut once = hpa_with(vec![
            container_resource_metric("api", ResourceKind::Cpu, 50),
            ext("datadogmetric@shop:checkout-memory-api", 90),
        ]);
        rewrite_metrics(&mut once, &recs).unwrap();
        let mut twice = once.clone();
        rewrite_metrics(&mut twice, &recs).unwrap();
        assert_eq!(once, twice);
        assert_eq!(utilizations(&once)[0], Some(72));
        assert_eq!(values(&once)[1], Some("81".into()));
    }

    #[test]
    fn unsupported_resource_in_recommendation_is_a_naming_error() {
        let recs = vec![ContainerTargetUtilization {
            container_name: "api".into(),
            target_utilization: BTreeMap::from([(
                "nvidia.com/gpu".to_string(),
                60,
            )]),
        }];
        let mut hpa = hpa_with(vec![]);
        let err = rewrite_metrics(&mut hpa, &recs).unwrap_err();
        assert!(matches!(
            err,
            HpaError::Naming(NamingError::UnsupportedResource(r)) if r == "nvidia.com/gpu"
        ));
    }

    #[test]
    fn hpa_without_annotations_cannot_be_rewritten() {
        let mut hpa = hpa_with(vec![]);
        hpa.metadata.annotations = None;
        assert_eq!(
            rewrite_target(&mut hpa, "api", ResourceKind::Cpu, 60),
            Err(NamingError::MissingPrefix {
                annotation: CPU_METRIC_PREFIX_ANNOTATION
            })
        );
    }
}
