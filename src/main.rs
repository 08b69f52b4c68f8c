use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use pagepost::{config, db, graph::GraphClient, storage::MediaStore, worker};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/pagepost.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let store = MediaStore::new(cfg.media_dir());
    let publisher = GraphClient::from_config(&cfg)?;

    info!(
        interval_ms = cfg.app.sweep_interval_ms,
        "starting worker sweep loop"
    );
    let mut tick = tokio::time::interval(Duration::from_millis(cfg.app.sweep_interval_ms));
    loop {
        tick.tick().await;
        match worker::run_sweep(&pool, &store, &publisher, chrono::Utc::now()).await {
            Ok(report) if report.claimed > 0 => {
                info!(
                    claimed = report.claimed,
                    posted = report.posted,
                    failed = report.failed,
                    "sweep report"
                );
            }
            Ok(_) => {}
            Err(err) => error!(?err, "sweep error"),
        }
    }
}
