//! tradepulse server: headless, always-on trading engine.
//!
//! Wires the exchange adapters, the position cache and its private
//! WebSocket feed, the strategy registry, and the session-aware scheduler,
//! then runs until SIGINT.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::prelude::*;

use tradepulse::application::ai::{AiOracle, DisabledAiOracle, HttpAiOracle};
use tradepulse::application::hedging::HedgingService;
use tradepulse::application::market_data::MarketDataCache;
use tradepulse::application::mtf::MtfConfirmer;
use tradepulse::application::orders::OrderManager;
use tradepulse::application::positions::{PositionCache, PositionStateMachine};
use tradepulse::application::risk::RiskManager;
use tradepulse::application::scheduler::{StrategyScheduler, TradeExecutor};
use tradepulse::application::strategies::{
    DefaultStrategy, FibonacciStrategy, MaCrossoverStrategy, NewsSentimentStrategy, RsiStrategy,
    SniperStrategy, StrategyRegistry,
};
use tradepulse::application::weighting::SignalWeightingService;
use tradepulse::config::Config;
use tradepulse::domain::ports::{
    ExchangeAdapter, OrderRepository, SignalPerformanceRepository,
};
use tradepulse::domain::trading::types::Exchange;
use tradepulse::infrastructure::bybit::{BybitAdapter, BybitPrivateStream};
use tradepulse::infrastructure::mexc::MexcAdapter;
use tradepulse::infrastructure::persistence::{
    Database, SqliteOrderRepository, SqliteSignalPerformanceRepository,
};
use tradepulse::infrastructure::repositories::{
    InMemoryOrderRepository, InMemorySignalPerformanceRepository,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("tradepulse {} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: sniper symbols {:?}, default symbols {:?}",
        config.schedule.sniper_symbols, config.schedule.default_symbols
    );

    // Repositories: SQLite when reachable, in-memory otherwise.
    let (order_repository, performance_repository): (
        Arc<dyn OrderRepository>,
        Arc<dyn SignalPerformanceRepository>,
    ) = match Database::new(&config.database_url).await {
        Ok(database) => (
            Arc::new(SqliteOrderRepository::new(database.clone())),
            Arc::new(SqliteSignalPerformanceRepository::new(database)),
        ),
        Err(e) => {
            warn!(
                "Database unavailable ({:#}); falling back to in-memory stores",
                e
            );
            (
                Arc::new(InMemoryOrderRepository::new()),
                Arc::new(InMemorySignalPerformanceRepository::new()),
            )
        }
    };

    // Exchange adapters.
    let mut adapters: HashMap<Exchange, Arc<dyn ExchangeAdapter>> = HashMap::new();
    adapters.insert(
        Exchange::Bybit,
        Arc::new(BybitAdapter::new(config.bybit.clone())),
    );
    if config.mexc.has_credentials() {
        adapters.insert(
            Exchange::Mexc,
            Arc::new(MexcAdapter::new(config.mexc.clone())),
        );
    } else {
        info!("MEXC credentials absent; MEXC routing disabled");
    }

    let market_data = Arc::new(MarketDataCache::new(adapters.clone()));
    let position_cache = Arc::new(PositionCache::new());

    // Private position stream keeps the cache authoritative.
    if config.bybit.has_credentials() {
        BybitPrivateStream::new(config.bybit.clone(), Arc::clone(&position_cache)).spawn();
    } else {
        warn!("Bybit credentials absent; private position stream disabled");
    }

    let order_manager = Arc::new(OrderManager::new(
        adapters.clone(),
        Arc::clone(&position_cache),
        Arc::clone(&order_repository),
    ));

    let risk_manager = Arc::new(RiskManager::new(
        config.risk.clone(),
        Arc::clone(&market_data),
        Arc::clone(&position_cache),
        Arc::clone(&performance_repository),
        config.sniper.stop_loss_percent_max,
    ));

    let state_machine = Arc::new(PositionStateMachine::new(
        config.sniper.clone(),
        Arc::clone(&order_manager),
        Arc::clone(&position_cache),
        Arc::clone(&risk_manager),
    ));

    let ai_oracle: Arc<dyn AiOracle> = if config.ai.is_configured() {
        Arc::new(HttpAiOracle::new(config.ai.clone())?)
    } else {
        info!("AI endpoint not configured; oracle disabled");
        Arc::new(DisabledAiOracle)
    };

    let mtf_confirmer = Arc::new(MtfConfirmer::new(Arc::clone(&market_data)));
    let weighting = Arc::new(SignalWeightingService::new(Arc::clone(
        &performance_repository,
    )));

    // Strategy registry.
    let mut registry = StrategyRegistry::new();
    registry.register(Arc::new(SniperStrategy::new(
        config.sniper.clone(),
        Arc::clone(&market_data),
        Arc::clone(&ai_oracle),
        Arc::clone(&mtf_confirmer),
        Arc::clone(&position_cache),
        Arc::clone(&risk_manager),
        Arc::clone(&state_machine),
        Arc::clone(&weighting),
    )));
    registry.register(Arc::new(DefaultStrategy::new(
        Arc::clone(&market_data),
        Arc::clone(&position_cache),
        Arc::clone(&risk_manager),
        Arc::clone(&state_machine),
    )));
    registry.register(Arc::new(MaCrossoverStrategy::new(
        Arc::clone(&market_data),
        Arc::clone(&risk_manager),
    )));
    registry.register(Arc::new(RsiStrategy::new(
        Arc::clone(&market_data),
        Arc::clone(&risk_manager),
    )));
    registry.register(Arc::new(FibonacciStrategy::new(
        Arc::clone(&market_data),
        Arc::clone(&risk_manager),
    )));
    registry.register(Arc::new(NewsSentimentStrategy::new(
        Arc::clone(&market_data),
        Arc::clone(&risk_manager),
        std::env::var("NEWS_FEED_URL")
            .unwrap_or_else(|_| "https://cointelegraph.com/rss".to_string()),
    )));
    let registry = Arc::new(registry);
    info!("Strategies registered: {:?}", registry.ids());

    let executor = Arc::new(TradeExecutor::new(
        Arc::clone(&registry),
        adapters.clone(),
        Arc::clone(&market_data),
        Arc::clone(&position_cache),
        Arc::clone(&order_manager),
        Arc::clone(&risk_manager),
    ));

    let hedging = Arc::new(HedgingService::new(
        config.hedge.clone(),
        Arc::clone(&market_data),
        Arc::clone(&position_cache),
        Arc::clone(&order_manager),
        Arc::clone(&ai_oracle),
    ));

    let scheduler = Arc::new(StrategyScheduler::new(
        config.schedule.clone(),
        executor,
        hedging,
    ));

    // The sniper flag defaults off; operators opt in explicitly.
    if std::env::var("SNIPER_AUTOSTART")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        scheduler.start_sniper();
    }

    let handles = scheduler.start();
    info!("Scheduler running ({} periodic tasks)", handles.len());

    tokio::signal::ctrl_c().await?;
    info!("SIGINT received, shutting down");
    scheduler.shutdown().await;
    for handle in handles {
        handle.abort();
    }
    info!("tradepulse stopped");
    Ok(())
}
