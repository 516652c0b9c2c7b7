use kube::Client;
use tokio::task::JoinHandle;

use crate::{config::HpaConfig, controller::run_controller};

/// Spawn the Kubernetes controller loop.
pub fn spawn_controller(
    client: Client,
    cfg: HpaConfig,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_controller(client, cfg).await })
}

/// Start the controller and wait until it stops (on SIGTERM/ctrl-c).
pub async fn run_all(client: Client, cfg: HpaConfig) -> anyhow::Result<()> {
    spawn_controller(client, cfg).await??;
    Ok(())
}
