//! Market Data Service Binary
//!
//! Starts the venue feeds, the market-hours supervisor, and the HTTP API.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-data-service
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `FINNHUB_API_KEY` or `FINNHUB_<SYMBOL>_API_KEY` per equities symbol
//!
//! ## Optional
//! - `PORT`: HTTP port (default: 8080)
//! - `REDIS_URL`: Snapshot store (default: in-memory)
//! - `EQUITY_SYMBOLS`, `CRYPTO_SYMBOLS`: Tracked instruments
//! - `FINNHUB_WS_URL`, `BINANCE_WS_URL`: Venue endpoints
//! - `SUPERVISOR_TICK_SECS`, `CRYPTO_WATCHDOG_SECS`, `RECONNECT_DELAY_SECS`,
//!   `KEEPALIVE_INTERVAL_SECS`, `CRYPTO_THROTTLE_SECS`: Timers
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log filter (default: `market_data_service=info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use market_data_service::application::services::{CryptoIngest, Throttle};
use market_data_service::infrastructure::feeds::{
    BinanceClient, BinanceClientConfig, ConnectionRegistry, FinnhubClientConfig,
    FinnhubTradeDecoder,
};
use market_data_service::infrastructure::{store, telemetry};
use market_data_service::{
    AppState, CryptoWatchdog, EquitiesIngest, HttpServer, MarketCalendar, QueryService,
    ServiceConfig, Supervisor, SupervisorConfig, init_metrics,
};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Upper bound on waiting for background tasks after a shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow::anyhow!("failed to install rustls crypto provider").into());
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting market data service");

    let _metrics_handle = init_metrics().context("installing Prometheus recorder")?;

    let config = ServiceConfig::from_env().context("loading configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let calendar = MarketCalendar::us_equities();

    // Store connect retries until Redis answers or a signal arrives
    let signals = tokio::spawn(await_shutdown(shutdown_token.clone()));
    let store = match store::connect(&config.store, &shutdown_token).await {
        Ok(store) => store,
        Err(_) if shutdown_token.is_cancelled() => {
            tracing::info!("Shutdown requested before the snapshot store answered");
            return Ok(());
        }
        Err(e) => return Err(anyhow::Error::new(e).context("connecting to snapshot store").into()),
    };

    // Equities: one socket per symbol, started and stopped by the supervisor
    let equities_ingest = EquitiesIngest::new(Arc::clone(&store));
    let finnhub_configs = config
        .catalog
        .equities()
        .iter()
        .filter_map(|symbol| {
            config.finnhub_url(symbol).map(|url| FinnhubClientConfig {
                symbol: symbol.clone(),
                url,
                reconnect_delay: config.timing.reconnect_delay,
                keepalive_interval: config.timing.keepalive_interval,
            })
        })
        .collect();
    let registry = Arc::new(ConnectionRegistry::new(
        finnhub_configs,
        equities_ingest,
        shutdown_token.child_token(),
    ));

    // Crypto: one shared socket, always on
    let crypto_ingest = Arc::new(CryptoIngest::new(
        Arc::clone(&store),
        Throttle::new(config.timing.crypto_throttle),
    ));
    let (binance_client, binance_handle) = BinanceClient::new(
        BinanceClientConfig {
            url: config.venues.binance_ws_url.clone(),
            symbols: config.catalog.crypto().to_vec(),
            reconnect_delay: config.timing.reconnect_delay,
        },
        crypto_ingest,
        shutdown_token.child_token(),
    );
    let crypto_state = Arc::clone(binance_handle.state());

    let supervisor = Supervisor::new(
        Arc::clone(&store),
        config.catalog.clone(),
        calendar,
        registry.clone(),
        Arc::new(FinnhubTradeDecoder::new()),
        SupervisorConfig {
            tick_interval: config.timing.supervisor_tick,
            ..SupervisorConfig::default()
        },
    );

    let watchdog = CryptoWatchdog::new(
        Arc::clone(&store),
        &config.catalog,
        Arc::new(binance_handle),
        config.timing.crypto_watchdog,
    );

    let query = QueryService::new(Arc::clone(&store), config.catalog.clone(), calendar);
    let app_state = Arc::new(
        AppState::new(query, Arc::clone(&store), env!("CARGO_PKG_VERSION"))
            .with_feeds(Arc::clone(&registry), crypto_state),
    );
    let http_server = HttpServer::new(config.server.port, app_state, shutdown_token.clone());

    let mut tasks = JoinSet::new();
    tasks.spawn(binance_client.run());
    tasks.spawn(supervisor.run(shutdown_token.clone()));
    tasks.spawn(watchdog.run(shutdown_token.clone()));

    let http_shutdown = shutdown_token.clone();
    tasks.spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
            http_shutdown.cancel();
        }
    });

    tracing::info!("Market data service ready");

    if let Err(e) = signals.await {
        tracing::error!(error = %e, "Signal listener failed");
        shutdown_token.cancel();
    }

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        tracing::warn!("Shutdown timed out, aborting remaining tasks");
        tasks.abort_all();
    }

    tracing::info!("Market data service stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        port = config.server.port,
        equities = ?config.catalog.equities(),
        crypto = ?config.catalog.crypto(),
        store = if config.store.redis_url.is_some() { "redis" } else { "memory" },
        "Configuration loaded"
    );
    tracing::debug!(
        finnhub_ws_url = %config.venues.finnhub_ws_url,
        binance_ws_url = %config.venues.binance_ws_url,
        timing = ?config.timing,
        "Venue endpoints"
    );
}

/// Wait for SIGINT or SIGTERM, then cancel `shutdown_token`.
///
/// If a handler cannot be installed, only the other signal (or an internal
/// cancellation) ends the wait.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::warn!("Internal shutdown requested");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
