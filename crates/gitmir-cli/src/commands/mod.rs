pub mod history;
pub mod mirror;
pub mod run;
pub mod status;
pub mod sync;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Manage configured mirrors
    Mirror {
        #[command(subcommand)]
        action: mirror::MirrorAction,
    },
    /// Trigger a sync for one mirror, or every enabled mirror
    Sync(sync::SyncArgs),
    /// Show sync history
    History(history::HistoryArgs),
    /// Show status of all mirrors
    Status(status::StatusArgs),
    /// Start the long-running scheduler loop
    Run(run::RunArgs),
}

pub async fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Mirror { action } => mirror::run(action).await,
        Command::Sync(args) => sync::run(args).await,
        Command::History(args) => history::run(args).await,
        Command::Status(args) => status::run(args).await,
        Command::Run(args) => run::run(args).await,
    }
}
