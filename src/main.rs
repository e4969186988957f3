use clap::Parser;
use netquery_cache::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Config => cli::show_config::run(),
        Command::Stats(args) => cli::stats::run(args).await,
        Command::PurgeDisk => cli::purge_disk::run(),
    }
}
