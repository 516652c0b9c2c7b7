use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::ResourceExt;
use tracing::{debug, info, instrument, trace, warn};

use super::status::next_status;
use crate::config::CoreConfig;
use crate::crd::workload_autoscaler::{
    Phase, WorkloadAutoscaler, WorkloadAutoscalerStatus,
};
use crate::error::{HpaError, StoreError};
use crate::hpa::{self, ReplicaPlan};
use crate::store::AutoscalerStore;

const BASE_CONFLICT_BACKOFF_MS: u64 = 100;
pub const MAX_CONFLICT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapOutcome {
    Created(HorizontalPodAutoscaler),
    /// An autoscaler with the same name already exists; it is left as is.
    Adopted,
    /// The workload has no replicas, so bounds of `0..0` would be
    /// rejected; nothing is created until it scales up.
    Deferred,
}

/// Where the autoscaler for this pass came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HpaSource {
    Existing,
    Created,
    Adopted,
    /// No autoscaler exists yet; see `BootstrapOutcome::Deferred`
    Deferred,
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub hpa_name: String,
    pub source: HpaSource,
    /// `None` when the phase does not apply recommendations yet
    pub plan: Option<ReplicaPlan>,
    pub status: WorkloadAutoscalerStatus,
}

impl ReconcileOutcome {
    pub fn phase(&self) -> Phase {
        self.status.phase
    }
}

/// Runs one reconciliation pass for a workload autoscaler against a store.
pub struct HpaReconciler<S> {
    store: Arc<S>,
    cfg: CoreConfig,
    max_retries: usize,
}

impl<S: AutoscalerStore> HpaReconciler<S> {
    pub fn new(store: Arc<S>, cfg: CoreConfig, max_retries: usize) -> Self {
        Self {
            store,
            cfg,
            max_retries,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Creates the initial autoscaler for `wa`, sized around the
    /// deployment's current replica count.
    #[instrument(level = "debug", skip_all, fields(name = %wa.name_any()))]
    pub async fn bootstrap(
        &self,
        wa: &WorkloadAutoscaler,
    ) -> Result<BootstrapOutcome, HpaError> {
        let ns = namespace_of(wa)?;
        let replicas = self
            .store
            .get_deployment_replicas(&ns, &wa.spec.target_refs.deployment_name)
            .await?;
        if replicas <= 0 {
            warn!(%ns, deployment = %wa.spec.target_refs.deployment_name, "workload has no replicas; hpa bootstrap deferred");
            return Ok(BootstrapOutcome::Deferred);
        }
        let hpa = hpa::build_hpa(wa, replicas, &self.cfg)?;
        match self.store.create_hpa(&hpa).await {
            Ok(created) => {
                info!(%ns, hpa = %created.name_any(), replicas, "hpa created");
                Ok(BootstrapOutcome::Created(created))
            }
            Err(StoreError::AlreadyExists(what)) => {
                info!(%ns, %what, "hpa already exists; adopting");
                Ok(BootstrapOutcome::Adopted)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_hpa(
        &self,
        wa: &WorkloadAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, HpaError> {
        let ns = namespace_of(wa)?;
        Ok(self.store.get_hpa(&ns, &wa.hpa_name()).await?)
    }

    /// Rewrites metric targets and replica bounds from the recommendations
    /// on `wa` and writes the autoscaler back.
    ///
    /// Each attempt starts from a fresh read. A write conflict restarts the
    /// whole attempt; any other failure leaves the stored autoscaler
    /// untouched.
    pub async fn update_from_recommendation(
        &self,
        wa: &WorkloadAutoscaler,
        now: &DateTime<Utc>,
    ) -> Result<(HorizontalPodAutoscaler, ReplicaPlan), HpaError> {
        let mut attempt = 0;
        loop {
            match self.update_once(wa, now).await {
                Ok(out) => return Ok(out),
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(name = %wa.name_any(), error = %e, "hpa update retries exhausted");
                        return Err(e);
                    }
                    let backoff = conflict_backoff(attempt);
                    trace!(name = %wa.name_any(), attempt, backoff_ms = backoff.as_millis() as u64, "hpa update conflict; retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn update_once(
        &self,
        wa: &WorkloadAutoscaler,
        now: &DateTime<Utc>,
    ) -> Result<(HorizontalPodAutoscaler, ReplicaPlan), HpaError> {
        let mut hpa = self.get_hpa(wa).await?;
        let recs = wa
            .status
            .as_ref()
            .map(|s| &s.recommendations.horizontal)
            .cloned()
            .unwrap_or_default();

        hpa::rewrite_metrics(&mut hpa, &recs.target_utilizations)?;
        let plan = hpa::plan_replicas(
            &hpa,
            &recs,
            wa.phase(),
            self.cfg.reduction_factor,
            now,
        )?;
        hpa::apply_plan(&mut hpa, &plan);

        let updated = self.store.update_hpa(&hpa).await?;
        debug!(hpa = %updated.name_any(), min = plan.min, max = plan.max, phase = %plan.phase, "hpa updated from recommendation");
        Ok((updated, plan))
    }

    /// One full pass: get or bootstrap the autoscaler, apply
    /// recommendations when the phase allows it, and compute the status to
    /// persist.
    #[instrument(skip_all, fields(ns = %wa.namespace().unwrap_or_default(), name = %wa.name_any()))]
    pub async fn reconcile(
        &self,
        wa: &WorkloadAutoscaler,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, HpaError> {
        let ns = namespace_of(wa)?;
        let hpa_name = wa.hpa_name();

        let source = match self.store.get_hpa(&ns, &hpa_name).await {
            Ok(_) => HpaSource::Existing,
            Err(e) if e.is_not_found() => match self.bootstrap(wa).await? {
                BootstrapOutcome::Created(_) => HpaSource::Created,
                BootstrapOutcome::Adopted => HpaSource::Adopted,
                BootstrapOutcome::Deferred => HpaSource::Deferred,
            },
            Err(e) => return Err(e.into()),
        };

        let phase = wa.phase();
        let plan = if source == HpaSource::Deferred {
            None
        } else if phase.applies_recommendations() {
            let (_, plan) = self.update_from_recommendation(wa, &now).await?;
            if plan.phase != phase {
                info!(%ns, hpa = %hpa_name, from = %phase, to = %plan.phase, min = plan.min, "phase transition");
            }
            Some(plan)
        } else {
            debug!(%ns, hpa = %hpa_name, %phase, "recommendations not applied in this phase");
            None
        };

        let status =
            next_status(wa.status.as_ref(), &hpa_name, source, phase, plan, now);
        Ok(ReconcileOutcome {
            hpa_name,
            source,
            plan,
            status,
        })
    }
}

/// Delay before retry `attempt` (1-based): 100ms doubling per attempt,
/// capped at `MAX_CONFLICT_BACKOFF`.
pub fn conflict_backoff(attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(16) as u32;
    let ms = BASE_CONFLICT_BACKOFF_MS.saturating_mul(1u64 << shift);
    Duration::from_millis(ms).min(MAX_CONFLICT_BACKOFF)
}

fn namespace_of(wa: &WorkloadAutoscaler) -> Result<String, HpaError> {
    wa.namespace()
        .ok_or(HpaError::MissingWorkloadField("metadata.namespace"))
}
