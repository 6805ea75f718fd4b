//! rental-api: HTTP surface for the NFT rental builder.
//!
//! Derives the provider and user accounts from injected seed phrases,
//! queries Koios for balances, assets, UTXOs and protocol parameters, and
//! serves the rental operations under `/Rentals/*`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

mod routes;

use rental_core::traits::ChainQuery;
use rental_koios::{KoiosClient, RetryPolicy};
use rental_service::{RentalService, Settings};

#[derive(Parser, Debug)]
#[command(name = "rental-api", about = "NFT rental transaction builder API", version)]
struct Args {
    /// Settings file (TOML). Defaults to `<config dir>/nft-rental/config.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `bind_addr` from the settings.
    #[arg(long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format: "text" or "json".
    #[arg(long, default_value = "text")]
    log_format: String,
}

/// Shared application state passed to every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RentalService>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }

    let koios_url = settings.koios_url();
    info!(
        network = %settings.network,
        koios = %koios_url,
        bind = %settings.bind_addr,
        sale_price = settings.rental.sale_price_lovelace,
        "Starting rental-api"
    );

    let retry = RetryPolicy {
        max_attempts: settings.koios.max_attempts,
        initial_backoff_ms: settings.koios.initial_backoff_ms,
        max_backoff_ms: settings.koios.max_backoff_ms,
    };
    let gateway: Arc<dyn ChainQuery> = Arc::new(
        KoiosClient::new(&koios_url, Duration::from_secs(settings.koios.timeout_secs), retry)
            .context("Failed to build Koios client")?,
    );

    let service = {
        let seeds = settings.seeds().context("Failed to load seed phrases")?;
        RentalService::from_seeds(gateway, &seeds, &settings).context("Failed to derive accounts")?
    };
    let state = AppState { service: Arc::new(service) };

    spawn_expiry_sweep(Arc::clone(&state.service), Duration::from_secs(settings.rental.poll_interval_secs.max(1)));

    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind_addr))?;

    info!("Listening on http://{}", settings.bind_addr);

    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}

/// Release expired leases on a fixed interval.
fn spawn_expiry_sweep(service: Arc<RentalService>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match service.expire_leases().await {
                Ok(expired) if !expired.is_empty() => info!(count = expired.len(), "expired leases released"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, kind = e.kind(), "lease expiry sweep failed"),
            }
        }
    });
}

fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
