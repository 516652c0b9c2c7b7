use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use kube::runtime::events::{EventType, Recorder};
use kube::{
    Client, Resource, ResourceExt,
    api::Api,
    runtime::{Controller, controller::Action, watcher::Config},
};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::HpaConfig;
use crate::crd::workload_autoscaler::{Phase, WorkloadAutoscaler};
use crate::error::{HpaError, StoreError};
use crate::store::{KubeStore, PhaseStore};

pub mod events;
pub mod reconcile;
pub mod status;

pub use reconcile::{
    BootstrapOutcome, HpaReconciler, HpaSource, ReconcileOutcome,
};

use events::{
    REASON_APPLY_FAILED, REASON_HPA_ADOPTED, REASON_HPA_CREATED,
    REASON_RECOVERY_COMPLETE, emit_event,
};

const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error(transparent)]
    Hpa(#[from] HpaError),

    #[error("status update failed: {0}")]
    Status(#[source] StoreError),
}

impl ReconcileErr {
    fn is_retryable(&self) -> bool {
        match self {
            ReconcileErr::Hpa(e) => e.is_retryable(),
            ReconcileErr::Status(e) => e.is_conflict(),
        }
    }
}

pub struct ControllerContext {
    pub cfg: HpaConfig,
    pub reconciler: HpaReconciler<KubeStore>,
    pub recorder: Option<Recorder>,
}

pub async fn run_controller(
    client: Client,
    cfg: HpaConfig,
) -> anyhow::Result<()> {
    let api: Api<WorkloadAutoscaler> = match cfg.watch_namespace() {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let store = Arc::new(KubeStore::new(client.clone()));
    let recorder = cfg
        .events_enabled()
        .then(|| Recorder::new(client.clone(), "oprc-hpa".into()));
    let ctx = Arc::new(ControllerContext {
        reconciler: HpaReconciler::new(
            store,
            cfg.core(),
            cfg.update_max_retries,
        ),
        recorder,
        cfg,
    });
    info!(
        namespace = ctx.cfg.watch_namespace().unwrap_or("*"),
        resync_secs = ctx.cfg.resync_secs(),
        "starting workload autoscaler controller"
    );

    // Autoscaler writes are not watched: each BackToNormal decay step must
    // wait for the resync requeue, not for the echo of our own write.
    Controller::new(api, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    debug!(%obj_ref, ?action, "reconciled")
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

async fn reconcile(
    obj: Arc<WorkloadAutoscaler>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let resync = Action::requeue(Duration::from_secs(ctx.cfg.resync_secs()));
    if obj.meta().deletion_timestamp.is_some() {
        // The hpa carries an owner reference and is garbage collected.
        return Ok(Action::await_change());
    }
    let ns = obj.namespace().unwrap_or_default();
    let name = obj.name_any();

    let outcome = match ctx.reconciler.reconcile(&obj, Utc::now()).await {
        Ok(o) => o,
        Err(e) => {
            if !e.is_retryable() {
                publish(
                    &ctx,
                    &obj,
                    EventType::Warning,
                    REASON_APPLY_FAILED,
                    e.to_string(),
                )
                .await;
            }
            return Err(e.into());
        }
    };

    match outcome.source {
        HpaSource::Created => {
            let note = format!("created hpa {}", outcome.hpa_name);
            publish(&ctx, &obj, EventType::Normal, REASON_HPA_CREATED, note)
                .await;
        }
        HpaSource::Adopted => {
            let note = format!("adopted existing hpa {}", outcome.hpa_name);
            publish(&ctx, &obj, EventType::Normal, REASON_HPA_ADOPTED, note)
                .await;
        }
        HpaSource::Existing | HpaSource::Deferred => {}
    }
    let recovered = outcome.plan.filter(|p| {
        obj.phase() == Phase::BackToNormal && p.phase == Phase::Working
    });
    if let Some(plan) = recovered {
        let note = format!("minReplicas settled at {}", plan.min);
        publish(
            &ctx,
            &obj,
            EventType::Normal,
            REASON_RECOVERY_COMPLETE,
            note,
        )
        .await;
    }

    if status::status_changed(obj.status.as_ref(), &outcome.status) {
        ctx.reconciler
            .store()
            .save_status(
                &ns,
                &name,
                obj.resource_version().as_deref(),
                &outcome.status,
            )
            .await
            .map_err(ReconcileErr::Status)?;
        debug!(%ns, %name, phase = %outcome.phase(), "status saved");
    }

    Ok(resync)
}

async fn publish(
    ctx: &ControllerContext,
    obj: &WorkloadAutoscaler,
    type_: EventType,
    reason: &str,
    note: String,
) {
    if let Some(recorder) = ctx.recorder.as_ref() {
        let obj_ref = obj.object_ref(&());
        emit_event(recorder, &obj_ref, type_, reason, "Reconcile", Some(note))
            .await;
    }
}

fn error_policy(
    obj: Arc<WorkloadAutoscaler>,
    error: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    if error.is_retryable() {
        return Action::requeue(CONFLICT_REQUEUE);
    }
    warn!(name = %obj.name_any(), error = %error, "reconcile failed; hpa unchanged");
    Action::requeue(Duration::from_secs(ctx.cfg.resync_secs()))
}
