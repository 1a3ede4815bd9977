use clap::Args;
use comfy_table::{Cell, Color, Table};

use gitmir_core::config::Config;
use gitmir_core::models::mirror::LastStatus;
use gitmir_db::store::Store;

#[derive(Args)]
pub struct StatusArgs {}

pub async fn run(_args: StatusArgs) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = Store::open(std::path::Path::new(&config.store_dsn))?;

    let mirrors = store.list_mirrors(false).await?;
    if mirrors.is_empty() {
        println!("No mirrors configured. Use `gitmir mirror add` to register one.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["MIRROR", "ENABLED", "STATUS", "LAST SUCCESS", "LAST ERROR"]);

    let mut succeeded = 0u32;
    let mut failed = 0u32;
    for mirror in &mirrors {
        let (status_str, color) = match mirror.last_status {
            LastStatus::Success => {
                succeeded += 1;
                ("success", Color::Green)
            }
            LastStatus::Failed => {
                failed += 1;
                ("failed", Color::Red)
            }
            LastStatus::Running => ("running", Color::Yellow),
            LastStatus::Never => ("never", Color::White),
        };
        let last_success = mirror
            .last_success_at
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "—".to_string());
        let last_error = mirror.last_error_summary.as_deref().unwrap_or("—");

        table.add_row(vec![
            Cell::new(&mirror.name),
            Cell::new(mirror.enabled.to_string()),
            Cell::new(status_str).fg(color),
            Cell::new(last_success),
            Cell::new(last_error),
        ]);
    }

    println!("{table}");
    println!("Summary: {succeeded} succeeded | {failed} failed | {} total", mirrors.len());
    Ok(())
}
