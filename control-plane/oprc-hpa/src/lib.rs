//! Workload autoscaler controller: keeps each workload's
//! HorizontalPodAutoscaler in line with the recommendations published on
//! its `WorkloadAutoscaler` resource.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod hpa;
pub mod runtime;
pub mod store;

use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Installs the fmt subscriber. `RUST_LOG` wins over `default_env`.
pub fn init_tracing(default_env: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_env));

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}
