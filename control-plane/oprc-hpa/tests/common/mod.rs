#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::ResourceExt;
use oprc_hpa::config::CoreConfig;
use oprc_hpa::controller::HpaReconciler;
use oprc_hpa::crd::workload_autoscaler::{
    AutoscalingPolicy, ContainerResourcePolicy, ContainerTargetUtilization,
    HorizontalRecommendations, Phase, Recommendations, ReplicasRecommendation,
    TargetRefs, Weekday, WorkloadAutoscaler, WorkloadAutoscalerSpec,
    WorkloadAutoscalerStatus,
};
use oprc_hpa::error::StoreError;
use oprc_hpa::store::{AutoscalerStore, PhaseStore};
use tokio::sync::Mutex;

pub const NS: &str = "shop";
pub const NAME: &str = "checkout";
pub const DEPLOYMENT: &str = "checkout-app";
pub const HPA: &str = "checkout-hpa";

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

type Key = (String, String);

fn key(ns: &str, name: &str) -> Key {
    (ns.to_string(), name.to_string())
}

/// In-memory stand-in for the API server with resourceVersion checks.
#[derive(Default)]
pub struct MemStore {
    hpas: Mutex<BTreeMap<Key, HorizontalPodAutoscaler>>,
    deployments: Mutex<BTreeMap<Key, i32>>,
    /// Workload autoscaler status keyed with the object's resourceVersion
    statuses: Mutex<BTreeMap<Key, (String, WorkloadAutoscalerStatus)>>,
    rv: AtomicU64,
    /// Number of upcoming updates that lose to a concurrent writer
    pending_conflicts: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl MemStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_rv(&self) -> String {
        (self.rv.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    pub async fn put_deployment(&self, ns: &str, name: &str, replicas: i32) {
        self.deployments
            .lock()
            .await
            .insert(key(ns, name), replicas);
    }

    /// Stores `hpa` as-is, assigning a fresh resourceVersion.
    pub async fn put_hpa(&self, mut hpa: HorizontalPodAutoscaler) {
        hpa.metadata.resource_version = Some(self.next_rv());
        let k = key(&hpa.namespace().unwrap_or_default(), &hpa.name_any());
        self.hpas.lock().await.insert(k, hpa);
    }

    pub async fn hpa(
        &self,
        ns: &str,
        name: &str,
    ) -> Option<HorizontalPodAutoscaler> {
        self.hpas.lock().await.get(&key(ns, name)).cloned()
    }

    pub async fn status(
        &self,
        ns: &str,
        name: &str,
    ) -> Option<WorkloadAutoscalerStatus> {
        self.statuses
            .lock()
            .await
            .get(&key(ns, name))
            .map(|(_, s)| s.clone())
    }

    pub async fn status_version(
        &self,
        ns: &str,
        name: &str,
    ) -> Option<String> {
        self.statuses
            .lock()
            .await
            .get(&key(ns, name))
            .map(|(rv, _)| rv.clone())
    }

    /// Unconditional status write, as an operator's `kubectl patch` would
    /// do. Returns the new resourceVersion.
    pub async fn put_status(
        &self,
        ns: &str,
        name: &str,
        status: WorkloadAutoscalerStatus,
    ) -> String {
        let rv = self.next_rv();
        self.statuses
            .lock()
            .await
            .insert(key(ns, name), (rv.clone(), status));
        rv
    }

    pub fn inject_conflicts(&self, n: usize) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl AutoscalerStore for MemStore {
    async fn get_hpa(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<HorizontalPodAutoscaler, StoreError> {
        self.hpa(ns, name)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("hpa {ns}/{name}")))
    }

    async fn create_hpa(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let k = key(&hpa.namespace().unwrap_or_default(), &hpa.name_any());
        let mut hpas = self.hpas.lock().await;
        if hpas.contains_key(&k) {
            let what = format!("hpa {}/{}", k.0, k.1);
            return Err(StoreError::AlreadyExists(what));
        }
        let mut created = hpa.clone();
        created.metadata.resource_version = Some(self.next_rv());
        hpas.insert(k, created.clone());
        Ok(created)
    }

    async fn update_hpa(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let k = key(&hpa.namespace().unwrap_or_default(), &hpa.name_any());
        let what = format!("hpa {}/{}", k.0, k.1);
        let mut hpas = self.hpas.lock().await;
        let Some(stored) = hpas.get_mut(&k) else {
            return Err(StoreError::NotFound(what));
        };
        if self.take_conflict() {
            // Someone else wrote in between our read and this write.
            stored.metadata.resource_version = Some(self.next_rv());
            return Err(StoreError::Conflict(what));
        }
        if stored.metadata.resource_version != hpa.metadata.resource_version {
            return Err(StoreError::Conflict(what));
        }
        let mut updated = hpa.clone();
        updated.metadata.resource_version = Some(self.next_rv());
        *stored = updated.clone();
        Ok(updated)
    }

    async fn get_deployment_replicas(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<i32, StoreError> {
        self.deployments
            .lock()
            .await
            .get(&key(ns, name))
            .copied()
            .ok_or_else(|| {
                StoreError::NotFound(format!("deployment {ns}/{name}"))
            })
    }
}

#[async_trait]
impl PhaseStore for MemStore {
    async fn save_status(
        &self,
        ns: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &WorkloadAutoscalerStatus,
    ) -> Result<(), StoreError> {
        let k = key(ns, name);
        let mut statuses = self.statuses.lock().await;
        if let (Some(expected), Some((stored, _))) =
            (resource_version, statuses.get(&k))
        {
            if expected != stored {
                let what = format!("workloadautoscaler {ns}/{name}");
                return Err(StoreError::Conflict(what));
            }
        }
        statuses.insert(k, (self.next_rv(), status.clone()));
        Ok(())
    }
}

pub fn reconciler(
    store: Arc<MemStore>,
    factor: f64,
) -> HpaReconciler<MemStore> {
    let cfg = CoreConfig {
        reduction_factor: factor,
        ..CoreConfig::default()
    };
    HpaReconciler::new(store, cfg, 3)
}

/// Monday 2024-01-01, 10:00 UTC.
pub fn monday_10() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
}

pub fn all_day(weekday: Weekday, value: i32) -> ReplicasRecommendation {
    ReplicasRecommendation {
        weekday,
        from: 0,
        to: 24,
        value,
    }
}

pub fn policy(
    container: &str,
    modes: &[(&str, AutoscalingPolicy)],
) -> ContainerResourcePolicy {
    ContainerResourcePolicy {
        container_name: container.into(),
        autoscaling_policy: modes
            .iter()
            .map(|(r, p)| (r.to_string(), *p))
            .collect(),
    }
}

pub fn targets(
    container: &str,
    utilization: &[(&str, i32)],
) -> ContainerTargetUtilization {
    ContainerTargetUtilization {
        container_name: container.into(),
        target_utilization: utilization
            .iter()
            .map(|(r, v)| (r.to_string(), *v))
            .collect(),
    }
}

pub fn recommendations(
    target_utilizations: Vec<ContainerTargetUtilization>,
    min: Vec<ReplicasRecommendation>,
    max: Vec<ReplicasRecommendation>,
) -> HorizontalRecommendations {
    HorizontalRecommendations {
        target_utilizations,
        min_replicas: min,
        max_replicas: max,
    }
}

/// Workload autoscaler for `checkout` with one horizontally scaled `api`
/// container on cpu.
pub fn workload(
    phase: Phase,
    horizontal: HorizontalRecommendations,
) -> WorkloadAutoscaler {
    let mut wa = WorkloadAutoscaler::new(
        NAME,
        WorkloadAutoscalerSpec {
            target_refs: TargetRefs {
                deployment_name: DEPLOYMENT.into(),
                horizontal_pod_autoscaler_name: None,
            },
            resource_policy: vec![policy(
                "api",
                &[("cpu", AutoscalingPolicy::Horizontal)],
            )],
        },
    );
    wa.metadata.namespace = Some(NS.into());
    wa.metadata.uid = Some("uid-checkout".into());
    wa.status = Some(WorkloadAutoscalerStatus {
        phase,
        recommendations: Recommendations { horizontal },
        ..Default::default()
    });
    wa
}

pub fn set_phase(wa: &mut WorkloadAutoscaler, phase: Phase) {
    if let Some(s) = wa.status.as_mut() {
        s.phase = phase;
    }
}

pub fn bounds(hpa: &HorizontalPodAutoscaler) -> (Option<i32>, i32) {
    let spec = hpa.spec.as_ref().expect("hpa spec");
    (spec.min_replicas, spec.max_replicas)
}

pub fn external_value(
    hpa: &HorizontalPodAutoscaler,
    name: &str,
) -> Option<String> {
    hpa.spec
        .as_ref()?
        .metrics
        .as_ref()?
        .iter()
        .filter_map(|m| m.external.as_ref())
        .find(|e| e.metric.name == name)
        .and_then(|e| e.target.value.as_ref())
        .map(|q| q.0.clone())
}
