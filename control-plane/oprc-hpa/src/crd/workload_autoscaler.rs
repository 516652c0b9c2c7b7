use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "autoscaling.oaas.io",
    version = "v1alpha1",
    kind = "WorkloadAutoscaler",
    plural = "workloadautoscalers",
    shortname = "wa",
    namespaced,
    status = "WorkloadAutoscalerStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
pub struct WorkloadAutoscalerSpec {
    pub target_refs: TargetRefs,
    /// Per-container autoscaling mode for each resource
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_policy: Vec<ContainerResourcePolicy>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct TargetRefs {
    /// apps/v1 Deployment whose replicas are governed
    pub deployment_name: String,
    /// Defaults to `<name>-hpa` when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_pod_autoscaler_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct ContainerResourcePolicy {
    pub container_name: String,
    /// Keyed by resource name (cpu | memory)
    #[serde(default)]
    pub autoscaling_policy: BTreeMap<String, AutoscalingPolicy>,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq,
)]
#[serde(rename_all = "PascalCase")]
pub enum AutoscalingPolicy {
    Off,
    Vertical,
    Horizontal,
    /// Vertical sizing is primary; horizontal scaling is a safety net
    Mixed,
}

impl AutoscalingPolicy {
    pub fn scales_horizontally(self) -> bool {
        matches!(self, AutoscalingPolicy::Horizontal | AutoscalingPolicy::Mixed)
    }
}

#[derive(
    Deserialize,
    Serialize,
    Clone,
    Copy,
    Debug,
    JsonSchema,
    PartialEq,
    Eq,
    Default,
)]
pub enum Phase {
    #[default]
    Initializing,
    GatheringData,
    Working,
    Emergency,
    BackToNormal,
}

impl Phase {
    /// Phases in which recommendations are meaningful and get applied.
    pub fn applies_recommendations(self) -> bool {
        matches!(
            self,
            Phase::Working | Phase::Emergency | Phase::BackToNormal
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Initializing => write!(f, "Initializing"),
            Phase::GatheringData => write!(f, "GatheringData"),
            Phase::Working => write!(f, "Working"),
            Phase::Emergency => write!(f, "Emergency"),
            Phase::BackToNormal => write!(f, "BackToNormal"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct WorkloadAutoscalerStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub targets: Targets,
    #[serde(default)]
    pub recommendations: Recommendations,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

#[derive(
    Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq,
)]
pub struct Targets {
    /// Autoscaler created or adopted for this workload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizontal_pod_autoscaler: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct Recommendations {
    #[serde(default)]
    pub horizontal: HorizontalRecommendations,
}

/// Written by the recommender; read-only for this controller.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct HorizontalRecommendations {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_utilizations: Vec<ContainerTargetUtilization>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub min_replicas: Vec<ReplicasRecommendation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub max_replicas: Vec<ReplicasRecommendation>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct ContainerTargetUtilization {
    pub container_name: String,
    /// Resource name -> target utilization percent
    #[serde(default)]
    pub target_utilization: BTreeMap<String, i32>,
}

/// A replica count that applies on `weekday` for hours in `[from, to)`.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
pub struct ReplicasRecommendation {
    pub weekday: Weekday,
    pub from: u32,
    pub to: u32,
    pub value: i32,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq,
)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<chrono::Weekday> for Weekday {
    fn from(w: chrono::Weekday) -> Self {
        match w {
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
            chrono::Weekday::Sun => Weekday::Sunday,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        rename = "lastTransitionTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    HpaReady,
    RecommendationApplied,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl WorkloadAutoscaler {
    pub fn hpa_name(&self) -> String {
        match self.spec.target_refs.horizontal_pod_autoscaler_name.as_deref() {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!(
                "{}-hpa",
                self.metadata.name.as_deref().unwrap_or_default()
            ),
        }
    }

    pub fn phase(&self) -> Phase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}
