use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, trace};

use crate::crd::workload_autoscaler::{
    WorkloadAutoscaler, WorkloadAutoscalerStatus,
};
use crate::error::StoreError;

/// Reads and writes the autoscaler and the workload it scales.
#[async_trait]
pub trait AutoscalerStore: Send + Sync {
    async fn get_hpa(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<HorizontalPodAutoscaler, StoreError>;

    async fn create_hpa(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, StoreError>;

    /// Replaces the autoscaler. The write carries the resourceVersion read
    /// earlier, so a concurrent change surfaces as `StoreError::Conflict`.
    async fn update_hpa(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, StoreError>;

    async fn get_deployment_replicas(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<i32, StoreError>;
}

/// Persists the phase and the rest of the controller-owned status.
#[async_trait]
pub trait PhaseStore: Send + Sync {
    /// `resource_version` is the version the pass read. The phase is also
    /// written by operators, so a write against a changed object must fail
    /// with `StoreError::Conflict` instead of overwriting it.
    async fn save_status(
        &self,
        ns: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &WorkloadAutoscalerStatus,
    ) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn hpa_api(&self, ns: &str) -> Api<HorizontalPodAutoscaler> {
        Api::namespaced(self.client.clone(), ns)
    }
}

pub fn map_kube_err(e: kube::Error, what: &str) -> StoreError {
    match e {
        kube::Error::Api(ref resp) if resp.code == 404 => {
            StoreError::NotFound(what.to_string())
        }
        kube::Error::Api(ref resp)
            if resp.code == 409 && resp.reason == "AlreadyExists" =>
        {
            StoreError::AlreadyExists(what.to_string())
        }
        kube::Error::Api(ref resp) if resp.code == 409 => {
            StoreError::Conflict(what.to_string())
        }
        other => StoreError::Kube(other),
    }
}

/// Merge patch for the controller-owned status fields. Recommendations
/// belong to the recommender and are never sent. A resourceVersion in the
/// body acts as a precondition: the API server answers 409 on mismatch.
pub fn status_patch(
    resource_version: Option<&str>,
    status: &WorkloadAutoscalerStatus,
) -> serde_json::Value {
    let mut patch = json!({
        "status": {
            "phase": status.phase,
            "targets": status.targets,
            "conditions": status.conditions,
            "last_updated": status.last_updated,
        }
    });
    if let Some(rv) = resource_version {
        patch["metadata"] = json!({ "resourceVersion": rv });
    }
    patch
}

fn hpa_key(hpa: &HorizontalPodAutoscaler) -> (String, String) {
    (hpa.namespace().unwrap_or_default(), hpa.name_any())
}

#[async_trait]
impl AutoscalerStore for KubeStore {
    async fn get_hpa(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<HorizontalPodAutoscaler, StoreError> {
        self.hpa_api(ns)
            .get(name)
            .await
            .map_err(|e| map_kube_err(e, &format!("hpa {ns}/{name}")))
    }

    async fn create_hpa(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, StoreError> {
        let (ns, name) = hpa_key(hpa);
        debug!(%ns, %name, "creating hpa");
        self.hpa_api(&ns)
            .create(&PostParams::default(), hpa)
            .await
            .map_err(|e| map_kube_err(e, &format!("hpa {ns}/{name}")))
    }

    async fn update_hpa(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, StoreError> {
        let (ns, name) = hpa_key(hpa);
        trace!(%ns, %name, rv = ?hpa.resource_version(), "replacing hpa");
        self.hpa_api(&ns)
            .replace(&name, &PostParams::default(), hpa)
            .await
            .map_err(|e| map_kube_err(e, &format!("hpa {ns}/{name}")))
    }

    async fn get_deployment_replicas(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<i32, StoreError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), ns);
        let dep = api.get(name).await.map_err(|e| {
            map_kube_err(e, &format!("deployment {ns}/{name}"))
        })?;
        let replicas = dep
            .status
            .as_ref()
            .and_then(|s| s.replicas)
            .or_else(|| dep.spec.as_ref().and_then(|s| s.replicas))
            .unwrap_or(0);
        Ok(replicas)
    }
}

#[async_trait]
impl PhaseStore for KubeStore {
    async fn save_status(
        &self,
        ns: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &WorkloadAutoscalerStatus,
    ) -> Result<(), StoreError> {
        let api: Api<WorkloadAutoscaler> =
            Api::namespaced(self.client.clone(), ns);
        let patch = status_patch(resource_version, status);
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| {
                map_kube_err(e, &format!("workloadautoscaler {ns}/{name}"))
            })?;
        Ok(())
    }
}
