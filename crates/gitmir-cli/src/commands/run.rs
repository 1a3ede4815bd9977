use std::sync::Arc;

use clap::Args;
use tracing::info;

use gitmir_core::config::Config;
use gitmir_db::store::Store;
use gitmir_gitea::GiteaClient;
use gitmir_scheduler::Scheduler;

#[derive(Args)]
pub struct RunArgs {}

/// Starts the scheduler and blocks until a shutdown signal arrives,
/// draining in-flight syncs before returning. Validates the downstream
/// token against Gitea before starting anything, per spec §4.4/§6: a
/// `WhoAmI` call is required on boot and an unreachable/rejected Gitea is a
/// fatal startup error, not a per-sync surprise later on.
pub async fn run(_args: RunArgs) -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env()?);

    let gitea = GiteaClient::new(config.downstream_url.to_string(), &config.downstream_token);
    let who = gitea
        .who_am_i()
        .await
        .map_err(|e| anyhow::anyhow!("Gitea boot validation failed: {e}"))?;
    info!(gitea_user = %who, "validated downstream token");

    let store = Store::open(std::path::Path::new(&config.store_dsn))?;

    let scheduler = Arc::new(Scheduler::new(store, config));
    let handle = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    scheduler.shutdown().await;
    handle.await?;
    Ok(())
}
