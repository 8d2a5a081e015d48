use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stint_pipeline::SyncConfig;
use stint_store::PgStore;

#[derive(Debug, Parser)]
#[command(name = "stint-cli")]
#[command(about = "Stint internship listing tracker command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one full feed synchronization.
    Sync,
    /// Apply the database schema.
    Migrate,
    /// Serve the trigger endpoint (and optional in-process scheduler).
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = stint_pipeline::run_sync_once_from_env().await?;
            println!(
                "sync complete: run_id={} fetched={} replaced_ids={} new_companies={} reconciled={}",
                summary.run_id,
                summary.fetched,
                summary.replaced_ids,
                summary.new_companies,
                summary.reconciled
            );
        }
        Commands::Migrate => {
            let config = SyncConfig::from_env();
            let store = PgStore::connect(&config.database_url)
                .await
                .context("connecting to database")?;
            store.migrate().await.context("applying schema")?;
            println!("migrations applied");
        }
        Commands::Serve => {
            stint_web::serve_from_env().await?;
        }
    }

    Ok(())
}
