use clap::{Args, Subcommand};

use gitmir_core::config::Config;
use gitmir_core::models::mirror::Mirror;
use gitmir_db::store::Store;

#[derive(Subcommand)]
pub enum MirrorAction {
    /// Register a new mirror
    Add(AddArgs),
    /// List configured mirrors
    List,
    /// Show details of one mirror
    Show { name: String },
    /// Update a mirror's interval or enabled flag
    Update(UpdateArgs),
    /// Remove a mirror
    Remove { name: String },
}

#[derive(Args)]
pub struct AddArgs {
    /// Local name for this mirror
    name: String,
    /// Upstream clone URL
    upstream_url: String,
    /// Downstream organization namespace; empty pushes to the service user
    #[arg(long, default_value = "")]
    owner: String,
    /// Downstream repo name, defaults to `name`
    #[arg(long)]
    downstream_name: Option<String>,
    /// Override the default sync interval, in seconds
    #[arg(long)]
    interval_seconds: Option<u64>,
}

#[derive(Args)]
pub struct UpdateArgs {
    name: String,
    #[arg(long)]
    interval_seconds: Option<u64>,
    #[arg(long)]
    enabled: Option<bool>,
}

pub async fn run(action: MirrorAction) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = Store::open(std::path::Path::new(&config.store_dsn))?;

    match action {
        MirrorAction::Add(args) => {
            let downstream_name = args.downstream_name.unwrap_or_else(|| args.name.clone());
            let mut mirror = Mirror::new(args.name, args.upstream_url, args.owner, downstream_name);
            mirror.sync_interval_seconds = args.interval_seconds;
            let id = mirror.id.clone();
            let name = mirror.name.clone();
            store.upsert_mirror(mirror).await?;
            println!("Registered mirror '{name}' ({id})");
            Ok(())
        }
        MirrorAction::List => {
            let mirrors = store.list_mirrors(false).await?;
            if mirrors.is_empty() {
                println!("No mirrors configured. Use `gitmir mirror add` to register one.");
                return Ok(());
            }
            println!("{:<24} {:<9} {:<9} LAST SUCCESS", "NAME", "ENABLED", "STATUS");
            for mirror in &mirrors {
                let last = mirror
                    .last_success_at
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<24} {:<9} {:<9} {}",
                    mirror.name, mirror.enabled, mirror.last_status, last
                );
            }
            Ok(())
        }
        MirrorAction::Show { name } => {
            let mirror = find_mirror(&store, &name).await?;
            println!("Name:             {}", mirror.name);
            println!("Upstream:         {}", mirror.upstream_url);
            println!(
                "Downstream owner: {}",
                if mirror.pushes_to_org() { &mirror.downstream_owner } else { "(service user)" }
            );
            println!("Downstream name:  {}", mirror.downstream_name);
            println!("Enabled:          {}", mirror.enabled);
            println!(
                "Interval:         {}s",
                config.effective_interval(mirror.sync_interval_seconds)
            );
            println!("Last status:      {}", mirror.last_status);
            println!(
                "Last attempt:     {}",
                mirror.last_attempt_at.map(|dt| dt.to_rfc3339()).unwrap_or_else(|| "never".into())
            );
            println!(
                "Last success:     {}",
                mirror.last_success_at.map(|dt| dt.to_rfc3339()).unwrap_or_else(|| "never".into())
            );
            if let Some(err) = &mirror.last_error_summary {
                println!("Last error:       {err}");
            }
            Ok(())
        }
        MirrorAction::Update(args) => {
            let mut mirror = find_mirror(&store, &args.name).await?;
            if let Some(interval) = args.interval_seconds {
                mirror.sync_interval_seconds = Some(interval);
            }
            if let Some(enabled) = args.enabled {
                mirror.enabled = enabled;
            }
            mirror.updated_at = chrono::Utc::now();
            let name = mirror.name.clone();
            store.upsert_mirror(mirror).await?;
            println!("Updated mirror '{name}'");
            Ok(())
        }
        MirrorAction::Remove { name } => {
            let mirror = find_mirror(&store, &name).await?;
            store.delete_mirror(mirror.id).await?;
            println!("Removed mirror '{name}'");
            Ok(())
        }
    }
}

async fn find_mirror(store: &Store, name: &str) -> anyhow::Result<Mirror> {
    store
        .get_mirror_by_name(name.to_string())
        .await?
        .ok_or_else(|| anyhow::anyhow!("mirror '{name}' not found"))
}
