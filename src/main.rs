use std::path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use arxiv_harvester::harvester::output;
use arxiv_harvester::{Harvester, HarvesterArgs, OaiArgs, db, expand_path};
use clap::{Parser, Subcommand};
use tracing::info;

/// arXiv OAI-PMH harvester
#[derive(Debug, Parser)]
#[command(name = "arxiv-harvester")]
#[command(about = "arXiv OAI-PMH harvester", long_about = None)]
struct Cli {
    /// Database connection URL; records are stored when set
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum database connections
    #[arg(long, default_value_t = 5, env = "DB_MAX_CONNECTIONS")]
    db_max_connections: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the number of records in the listing
    Count(OaiArgs),

    /// Page through the listing and write articles and authors
    Harvest(HarvesterArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env first, then .env.local can override
    let _ = dotenvy::from_filename_override(".env");
    let _ = dotenvy::from_filename_override(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received interrupt, finishing current batch...");
        shutdown_clone.store(true, Ordering::Relaxed);
    });

    match args.command {
        Commands::Count(cfg) => {
            let harvester = Harvester::new(cfg.config(), shutdown)?;
            let total = harvester
                .total_record_count()
                .await
                .with_context(|| format!("Failed to count records at {}", cfg.endpoint))?;
            println!("{total}");
        }
        Commands::Harvest(cfg) => {
            if args.database_url.is_none() && cfg.output.is_none() {
                anyhow::bail!("Nowhere to write results: pass --output and/or --database-url");
            }

            let output_dir = cfg
                .output
                .as_deref()
                .map(|dir| path::absolute(expand_path(dir)))
                .transpose()?;
            let pool = match &args.database_url {
                Some(url) => Some(db::create_pool(url, args.db_max_connections).await?),
                None => None,
            };

            info!("Harvesting records from {}", cfg.oai.endpoint);
            let harvester = Harvester::new(cfg.oai.config(), shutdown.clone())?;
            let outcome = harvester.run(cfg.run_options()).await?;

            if let Some(dir) = &output_dir {
                output::write_outcome(dir, &outcome).await?;
            }
            if let Some(pool) = &pool {
                let summary = db::save_outcome(pool, &outcome).await?;
                info!(
                    "Stored {} article(s), {} author(s) and {} category link(s)",
                    summary.articles, summary.authors, summary.categories
                );
            }

            match outcome.resume() {
                Some(resume) => info!(
                    "Harvest stopped early; continue with --token {} --cursor {}",
                    resume.token, resume.cursor
                ),
                None => info!("Harvest complete"),
            }
        }
    }

    Ok(())
}
