mod collect;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "smpdb-cli")]
#[command(about = "SMPDB command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Enqueue one manual collection job and exit.
    Collect(collect::CollectArgs),
    /// Run pending database migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Collect(args) => collect::run(args).await,
        Commands::Migrate => migrate().await,
    }
}

async fn migrate() -> anyhow::Result<()> {
    let pool = smpdb_db::connect_pool_from_env().await?;
    let applied = smpdb_db::run_migrations(&pool).await?;
    println!("applied {applied} migration(s)");
    Ok(())
}
