//! Autoscaler rewriting core: pure functions over in-memory values.

pub mod bootstrap;
pub mod metrics;
pub mod naming;
pub mod planner;
pub mod window;

pub use bootstrap::build_hpa;
pub use metrics::{rewrite_metrics, rewrite_target};
pub use naming::{ResourceKind, external_metric_name};
pub use planner::{ReplicaPlan, apply_plan, plan_replicas};
