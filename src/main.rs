use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use medsync_server::ServerConfig;
use medsync_store::Database;

#[derive(Debug, Parser)]
#[command(name = "medsync", about = "Medication tracker with real-time dispatch")]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "MEDSYNC_PORT", default_value_t = 8080)]
    port: u16,

    /// Path to the SQLite database.
    #[arg(long, env = "MEDSYNC_DB")]
    db: Option<PathBuf>,

    /// Per-client outgoing queue capacity.
    #[arg(long, env = "MEDSYNC_QUEUE_CAPACITY", default_value_t = 64)]
    queue_capacity: usize,

    /// Seconds fan-out delivery may block on a full client queue before the
    /// client is disconnected.
    #[arg(long, env = "MEDSYNC_SEND_TIMEOUT", default_value_t = 5)]
    send_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting medsync server");

    let db_path = args.db.unwrap_or_else(|| dirs_home().join(".medsync").join("medsync.db"));
    let db = Database::open(&db_path)?;

    let config = ServerConfig {
        port: args.port,
        outgoing_capacity: args.queue_capacity,
        send_timeout: Duration::from_secs(args.send_timeout),
        ..Default::default()
    };
    let handle = medsync_server::start(config, db).await?;

    tracing::info!(port = handle.port, "medsync ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    Ok(())
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
