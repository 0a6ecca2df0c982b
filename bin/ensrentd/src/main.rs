//! ensrentd - ENS rental marketplace indexer.
//!
//! # Usage
//!
//! ```bash
//! # Start with default config
//! ensrentd --contract-address 0x...
//!
//! # Start with environment overrides
//! DATABASE_URL=postgres://localhost/ensrent RPC_URL=http://localhost:8545 ensrentd
//! ```

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

use alloy_primitives::Address;

use ensrent_chain::{EnsRentClient, EnsRentClientConfig};
use ensrent_core::error::IndexerError;
use ensrent_core::metrics::init_metrics;
use ensrent_core::ports::EventSource;
use ensrent_core::services::{ApplierConfig, EventApplier, RelistPolicy};
use ensrent_graphql::{build_schema, serve_with_shutdown, ServerConfig};
use ensrent_storage::{Database, DatabaseConfig, PgRepositories};

/// ensrentd CLI - ENS rental marketplace indexer.
#[derive(Parser, Debug)]
#[command(name = "ensrentd")]
#[command(about = "Event-sourced indexer for the ENS domain rental marketplace")]
#[command(version)]
struct Cli {
    /// Ethereum node HTTP RPC URL.
    #[arg(long, env = "RPC_URL", default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Rental marketplace contract address.
    #[arg(long, env = "CONTRACT_ADDRESS")]
    contract_address: Address,

    /// PostgreSQL database URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/ensrent"
    )]
    database_url: String,

    /// Block to start indexing from when the database is empty.
    #[arg(long, env = "START_BLOCK", default_value = "0")]
    start_block: u64,

    /// Blocks behind the head considered safe to read.
    #[arg(long, env = "CONFIRMATIONS", default_value = "5")]
    confirmations: u64,

    /// Seconds between head polls once caught up.
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "12")]
    poll_interval_secs: u64,

    /// Maximum block span per eth_getLogs call.
    #[arg(long, env = "BATCH_SIZE", default_value = "2000")]
    batch_size: u64,

    /// Relist behavior for already-listed tokens: coexist or supersede.
    #[arg(long, env = "RELIST_POLICY", default_value = "coexist", value_parser = parse_relist_policy)]
    relist_policy: RelistPolicy,

    /// GraphQL server port.
    #[arg(long, env = "GRAPHQL_PORT", default_value = "4000")]
    graphql_port: u16,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Run database migrations and exit.
    #[arg(long)]
    migrate_only: bool,

    /// Purge all indexed data from the database and exit.
    ///
    /// This will delete all listings and rentals, and reset the applier
    /// cursor. Schema/migrations are preserved.
    #[arg(long)]
    purge: bool,

    /// Skip confirmation prompt for destructive operations (like --purge).
    #[arg(long, short = 'y')]
    yes: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Parse relist policy from string.
fn parse_relist_policy(s: &str) -> Result<RelistPolicy, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled = match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>()
    {
        Ok(metrics_addr) => {
            match PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .install()
            {
                Ok(()) => {
                    init_metrics();
                    true
                }
                Err(e) => {
                    warn!(
                        "⚠️  Failed to start metrics exporter: {}. Continuing without metrics.",
                        e
                    );
                    false
                }
            }
        }
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            false
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting ensrentd");
    debug!(rpc_url = %cli.rpc_url, contract = %cli.contract_address, "Ethereum endpoint");
    debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────────
    let applier_db_config = DatabaseConfig::for_applier(&cli.database_url);
    let graphql_db_config = DatabaseConfig::for_graphql(&cli.database_url);

    info!("🗄️  Connecting to database...");
    let db = Database::connect(&applier_db_config)
        .await
        .context("Failed to connect to database")?;

    db.migrate().await.context("Failed to run migrations")?;
    info!("🗄️  Database ready (migrations applied)");

    if cli.migrate_only {
        info!("🛑 --migrate-only flag set, exiting");
        return Ok(());
    }

    if cli.purge {
        return handle_purge(&db, cli.yes).await;
    }

    let graphql_db = Database::connect(&graphql_db_config)
        .await
        .context("Failed to create GraphQL database pool")?;

    let db = Arc::new(db);
    let graphql_db = Arc::new(graphql_db);

    let applier_repositories = Arc::new(PgRepositories::new(db.clone()));
    let graphql_repositories = Arc::new(PgRepositories::new(graphql_db.clone()));

    // ─────────────────────────────────────────────────────────────────────────
    // 📡 ETHEREUM CONNECTION
    // ─────────────────────────────────────────────────────────────────────────
    info!("📡 Connecting to Ethereum node...");
    let chain_config = EnsRentClientConfig {
        http_url: cli.rpc_url.clone(),
        contract_address: cli.contract_address,
        confirmations: cli.confirmations,
        poll_interval: Duration::from_secs(cli.poll_interval_secs),
        batch_size: cli.batch_size,
    };

    let chain_client = EnsRentClient::connect(chain_config)
        .await
        .context("Failed to connect to Ethereum node")?;

    let chain_client = Arc::new(chain_client);

    let chain_id = chain_client.chain_id().await?;
    let head = chain_client.latest_block().await?;

    info!(chain_id = %chain_id, head = head, "🔗 Chain connected");

    let applier_config = ApplierConfig {
        chain_id,
        start_block: cli.start_block,
        relist_policy: cli.relist_policy,
        ..Default::default()
    };

    let applier = EventApplier::new(
        applier_config,
        chain_client.clone(),
        applier_repositories.clone(),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ SERVICES START
    // ─────────────────────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut graphql_shutdown_rx = shutdown_tx.subscribe();

    let graphql_config = ServerConfig {
        host: "0.0.0.0".to_string(),
        port: cli.graphql_port,
        enable_playground: true,
    };

    let schema = build_schema(graphql_repositories);
    let graphql_port = cli.graphql_port;
    let graphql_handle = tokio::spawn(
        async move {
            let shutdown_signal = async move {
                while !*graphql_shutdown_rx.borrow() {
                    if graphql_shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            };

            if let Err(e) = serve_with_shutdown(schema, graphql_config, shutdown_signal).await {
                error!(error = %e, "❌ Server error");
            }
            debug!("Server stopped");
        }
        .instrument(info_span!("graphql")),
    );

    let applier_shutdown_tx = shutdown_tx.clone();
    let applier_handle = tokio::spawn(
        async move {
            if let Err(e) = applier.run(shutdown_rx).await {
                match &e {
                    IndexerError::ShutdownRequested => {}
                    IndexerError::ChainMismatch { .. } | IndexerError::Consistency { .. } => {
                        // Fatal - trigger shutdown rather than grind on a
                        // projection we know is wrong
                        error!(error = ?e, "❌ Applier halted");
                        let _ = applier_shutdown_tx.send(true);
                    }
                    _ => error!(error = ?e, "❌ Applier error"),
                }
            }
        }
        .instrument(info_span!("applier")),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ ensrentd ready");
    info!("   ⚡ GraphQL:  http://localhost:{}/graphql", graphql_port);
    if metrics_enabled {
        info!(
            "   📊 Metrics:  http://localhost:{}/metrics",
            cli.metrics_port
        );
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    shutdown_signal().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────────
    info!("🛑 Shutting down...");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(Duration::from_secs(30), applier_handle).await {
        Ok(_) => debug!("Applier stopped"),
        Err(_) => warn!("⚠️  Applier shutdown timed out"),
    }

    match tokio::time::timeout(Duration::from_secs(10), graphql_handle).await {
        Ok(_) => debug!("GraphQL stopped"),
        Err(_) => warn!("⚠️  GraphQL shutdown timed out"),
    }

    db.close().await;
    graphql_db.close().await;

    info!("🛑 Shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Handle the --purge command.
async fn handle_purge(db: &Database, skip_confirmation: bool) -> Result<()> {
    warn!("⚠️  PURGE MODE: This will delete ALL indexed data!");
    warn!("   - All listings and rentals");
    warn!("   - The applier cursor will be reset");
    warn!("   - Schema and migrations will be preserved");

    if !skip_confirmation {
        print!("\n🔴 Are you sure you want to purge all data? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            info!("❌ Purge cancelled");
            return Ok(());
        }
    }

    info!("🗑️  Purging database...");

    let stats = db.purge().await.context("Failed to purge database")?;

    info!("✅ Database purged successfully");
    info!("   🏷️ Listings removed: {}", stats.listings_removed);
    info!("   🔑 Rentals removed: {}", stats.rentals_removed);
    info!("   The applier will start from the configured start block on next run");

    Ok(())
}
