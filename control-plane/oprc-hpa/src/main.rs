use envconfig::Envconfig;
use kube::Client;
use oprc_hpa::{config::HpaConfig, init_tracing, runtime};
use tracing::{debug, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    // kube talks TLS through rustls; pin aws-lc-rs before the first client.
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        debug!(?e, "crypto provider already installed");
    }

    let cfg = HpaConfig::init_from_env()?.apply_profile_defaults();
    cfg.validate()?;
    info!(
        profile = %cfg.profile,
        namespace = %cfg.k8s_namespace,
        reduction_factor = cfg.replica_reduction_factor,
        resync_secs = cfg.resync_secs(),
        events = cfg.events_enabled(),
        "starting oprc-hpa"
    );

    let client = Client::try_default().await?;
    runtime::run_all(client, cfg).await
}
