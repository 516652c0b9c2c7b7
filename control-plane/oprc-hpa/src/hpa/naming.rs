use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::NamingError;

pub const CPU_METRIC_PREFIX_ANNOTATION: &str =
    "autoscaling.oaas.io/container-based-cpu-metric-prefix";
pub const MEMORY_METRIC_PREFIX_ANNOTATION: &str =
    "autoscaling.oaas.io/container-based-memory-metric-prefix";

/// Resources that can be expressed as per-container autoscaler metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Cpu, ResourceKind::Memory];

    /// Kubernetes resource name.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
        }
    }

    pub fn prefix_annotation(self) -> &'static str {
        match self {
            ResourceKind::Cpu => CPU_METRIC_PREFIX_ANNOTATION,
            ResourceKind::Memory => MEMORY_METRIC_PREFIX_ANNOTATION,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(ResourceKind::Cpu),
            "memory" => Ok(ResourceKind::Memory),
            other => Err(NamingError::UnsupportedResource(other.to_string())),
        }
    }
}

/// Prefix stored on a freshly bootstrapped autoscaler, e.g.
/// `datadogmetric@shop:checkout-cpu-`.
///
/// The external metrics backend keys its series by the full name, so the
/// format must never change for existing autoscalers.
pub fn metric_prefix(
    provider: &str,
    namespace: &str,
    workload: &str,
    kind: ResourceKind,
) -> String {
    format!("{provider}@{namespace}:{workload}-{kind}-")
}

/// Prefix annotations for every supported resource kind.
pub fn prefix_annotations(
    provider: &str,
    namespace: &str,
    workload: &str,
) -> BTreeMap<String, String> {
    ResourceKind::ALL
        .into_iter()
        .map(|kind| {
            (
                kind.prefix_annotation().to_string(),
                metric_prefix(provider, namespace, workload, kind),
            )
        })
        .collect()
}

/// External metric name for `container`, built from the prefix annotation
/// stored for `kind`.
pub fn external_metric_name(
    annotations: &BTreeMap<String, String>,
    kind: ResourceKind,
    container: &str,
) -> Result<String, NamingError> {
    let key = kind.prefix_annotation();
    let prefix = annotations
        .get(key)
        .ok_or(NamingError::MissingPrefix { annotation: key })?;
    Ok(format!("{prefix}{container}"))
}
