mod config;
mod handler;
mod service;
mod ws;

use axum::{
    routing::{get, patch, put},
    Router,
};
use config::ApiConfig;
use connectors::{coingecko::CoinGeckoConnector, PriceSource};
use engine::{AlertEvaluator, Broadcaster, Poller, SubscriptionRegistry};
use service::{AlertService, AppState, CoinService, PortfolioService};
use std::net::SocketAddr;
use std::sync::Arc;
use store::{MemoryStore, PriceCache, RecordStore};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting CoinFolio API");

    let config = ApiConfig::from_env()
        .map_err(|e| format!("Failed to load configuration: {}", e))?;

    let source: Arc<dyn PriceSource> = Arc::new(
        CoinGeckoConnector::new(config.coingecko.clone())
            .map_err(|e| format!("Failed to create price source: {}", e))?,
    );
    let records: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let cache = Arc::new(PriceCache::new());

    let registry = Arc::new(SubscriptionRegistry::with_max_coins(
        config.coingecko.max_ids_per_call,
    ));
    let broadcaster = Arc::new(Broadcaster::new(registry, config.outbound_queue_capacity));
    let evaluator = Arc::new(AlertEvaluator::new(records.clone(), broadcaster.clone()));
    let poller = Arc::new(Poller::new(
        source.clone(),
        cache.clone(),
        broadcaster.clone(),
        evaluator,
        config.poller_config(),
    ));

    let coins = Arc::new(CoinService::new(source, cache).with_miss_ttl(config.poll_interval));
    let state = AppState {
        portfolio: Arc::new(PortfolioService::new(records.clone(), coins.clone())),
        alerts: Arc::new(AlertService::new(records)),
        coins,
        broadcaster,
    };

    let cancel = CancellationToken::new();
    let poller_task = poller.spawn(cancel.clone());

    // Create CORS middleware
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handler::health))
        .route("/api/v1/prices", get(handler::get_prices))
        .route(
            "/api/v1/prices/history/:coin_id",
            get(handler::get_price_history),
        )
        .route("/api/v1/prices/market", get(handler::get_market_data))
        .route("/api/v1/prices/search", get(handler::search_coins))
        .route("/api/v1/prices/trending", get(handler::trending_coins))
        .route(
            "/api/v1/portfolio",
            get(handler::get_portfolio).post(handler::add_holding),
        )
        .route(
            "/api/v1/portfolio/chart",
            get(handler::get_portfolio_chart),
        )
        .route(
            "/api/v1/portfolio/:id",
            put(handler::update_holding).delete(handler::delete_holding),
        )
        .route(
            "/api/v1/alerts",
            get(handler::list_alerts).post(handler::create_alert),
        )
        .route(
            "/api/v1/alerts/:id",
            put(handler::update_alert).delete(handler::delete_alert),
        )
        .route("/api/v1/alerts/:id/toggle", patch(handler::toggle_alert))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid listen address: {}", e))?;
    info!("Listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, waiting for the poller");
    cancel.cancel();
    match tokio::time::timeout(config.shutdown_grace, poller_task).await {
        Ok(Ok(())) => info!("Poller stopped"),
        Ok(Err(e)) => error!("Poller task failed: {}", e),
        Err(_) => warn!(
            "Poller did not stop within {:?}, abandoning it",
            config.shutdown_grace
        ),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
