mod commands;

use clap::Parser;

#[derive(Parser)]
#[command(name = "gitmir", version, about = "Continuous Gitea mirror sync engine")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    commands::run(cli.command).await
}
