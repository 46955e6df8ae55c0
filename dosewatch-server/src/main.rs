use std::sync::Arc;

use clap::Parser;
use dosewatch_core::{
    create_store, DosewatchConfig, FirebaseIdentityVerifier, ReminderSchedule, ServiceAccount, SystemClock,
};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use dosewatch_server::http::{self, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "dosewatch.toml")]
    config: String,

    /// Check that the reminder store is reachable, then exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match DosewatchConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let schedule = match ReminderSchedule::from_zone_name(&config.service.timezone) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let account = match ServiceAccount::load(&config.credentials) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Failed to load Firebase credentials: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(project_id = %account.project_id, "Firebase credentials loaded");

    let store = match create_store(&config.store, &account) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to create reminder store: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match store.ping().await {
            Ok(()) => println!("✅ {} store reachable", store.name()),
            Err(e) => {
                println!("❌ {} store check failed: {}", store.name(), e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let verifier = match FirebaseIdentityVerifier::new(&account.project_id, &config.identity) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Failed to create identity verifier: {}", e);
            std::process::exit(1);
        }
    };

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    tracing::info!(
        timezone = %schedule.timezone(),
        store = store.name(),
        "Starting Dosewatch"
    );

    let state = Arc::new(HttpState {
        store,
        verifier: Arc::new(verifier),
        clock: Arc::new(SystemClock),
        schedule,
    });

    http::start_http_server(state, &config.http, tx.subscribe()).await?;

    Ok(())
}
