//! Watchtower - pending-signature inbox discovery daemon

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchtower::{
    config::Args,
    ledger::{LedgerClient, LedgerClientConfig},
    retry::RetryConfig,
    store::MongoInboxStore,
    supervisor::{Poller, PollerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("watchtower={log_level},info").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Watchtower - pending-signature inbox");
    info!("======================================");
    info!("Ledger: {} ({})", args.api_url, args.network.as_str());
    info!("MongoDB: {} / {}", args.mongodb_uri, args.mongodb_db);
    info!("Users collection: {}", args.users_collection);
    info!("Poll interval: {}s", args.poll_interval_sec);
    info!("User concurrency: {}", args.user_concurrency);
    info!("Delegation depth: {}", args.delegation_depth);
    info!("Mode: {}", if args.dry_run { "DRY RUN" } else { "LIVE" });
    info!("======================================");

    let store = match MongoInboxStore::connect(
        &args.mongodb_uri,
        &args.mongodb_db,
        &args.users_collection,
    )
    .await
    {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let ledger = Arc::new(LedgerClient::new(LedgerClientConfig {
        endpoint: args.api_url.clone(),
        request_timeout: Duration::from_millis(args.request_timeout_ms),
        retry: RetryConfig {
            max_retries: args.max_retries,
            ..RetryConfig::default()
        },
        page_size: args.pending_page_size,
        ..LedgerClientConfig::default()
    }));

    let poller = Poller::new(
        ledger,
        store,
        PollerConfig {
            poll_interval: Duration::from_secs(args.poll_interval_sec),
            user_concurrency: args.user_concurrency,
            delegation_depth: args.delegation_depth,
            dry_run: args.dry_run,
        },
    );

    poller.run().await;

    info!("Clean shutdown");
    Ok(())
}
