use clap::Args;

use gitmir_core::config::Config;
use gitmir_db::store::Store;

#[derive(Args)]
pub struct HistoryArgs {
    /// Filter by mirror name
    mirror: Option<String>,
    #[arg(long, default_value = "20")]
    limit: u32,
}

pub async fn run(args: HistoryArgs) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = Store::open(std::path::Path::new(&config.store_dsn))?;

    let mirror_id = match args.mirror {
        Some(name) => Some(
            store
                .get_mirror_by_name(name.clone())
                .await?
                .ok_or_else(|| anyhow::anyhow!("mirror '{name}' not found"))?
                .id,
        ),
        None => None,
    };

    let attempts = store.recent_history(mirror_id, args.limit).await?;
    if attempts.is_empty() {
        println!("No sync history found.");
        return Ok(());
    }

    println!(
        "{:<20} {:<10} {:<16} {:<10} DETAIL",
        "STARTED", "TRIGGER", "STAGE", "OUTCOME"
    );
    for attempt in &attempts {
        let outcome = attempt
            .outcome
            .map(|o| o.to_string())
            .unwrap_or_else(|| "running".to_string());
        let detail = attempt.error_detail.as_deref().unwrap_or("-");
        println!(
            "{:<20} {:<10} {:<16} {:<10} {}",
            attempt.started_at.format("%Y-%m-%d %H:%M:%S"),
            attempt.trigger,
            attempt.stage_reached,
            outcome,
            detail,
        );
    }

    Ok(())
}
