use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder};
use tracing::trace;

pub const REASON_HPA_CREATED: &str = "HpaCreated";
pub const REASON_HPA_ADOPTED: &str = "HpaAdopted";
pub const REASON_RECOVERY_COMPLETE: &str = "RecoveryComplete";
pub const REASON_APPLY_FAILED: &str = "RecommendationApplyFailed";

pub async fn emit_event(
    recorder: &Recorder,
    obj_ref: &ObjectReference,
    type_: EventType,
    reason: &str,
    action: &str,
    note: Option<String>,
) {
    let res = recorder
        .publish(
            &Event {
                type_,
                reason: reason.into(),
                note,
                action: action.into(),
                secondary: None,
            },
            obj_ref,
        )
        .await;
    if let Err(e) = res {
        trace!(error = %e, %reason, "event publish failed");
    }
}
