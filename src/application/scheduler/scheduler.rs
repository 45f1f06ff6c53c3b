//! Session-aware strategy scheduler.
//!
//! Three independent periodic loops share this scheduler: the sniper tick
//! (fast, gated by the global on/off flag and the session scan interval),
//! the default tick (slow, serial), and the hedging tick (fixed cadence,
//! independent of the sniper flag).

use crate::application::hedging::HedgingService;
use crate::application::scheduler::executor::TradeExecutor;
use crate::application::scheduler::pool::EvaluationPool;
use crate::application::strategies::{DefaultStrategy, SniperStrategy};
use crate::config::ScheduleEnvConfig;
use crate::domain::market::MarketSession;
use crate::domain::trading::types::Exchange;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub struct StrategyScheduler {
    config: ScheduleEnvConfig,
    executor: Arc<TradeExecutor>,
    hedging: Arc<HedgingService>,
    pool: Arc<EvaluationPool>,
    sniper_active: AtomicBool,
    /// Monotonic scan-cycle counter; never reset, u64 so wrap is a
    /// non-issue in practice.
    cycle_counter: AtomicU64,
    in_progress: Arc<Mutex<HashSet<String>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl StrategyScheduler {
    pub fn new(
        config: ScheduleEnvConfig,
        executor: Arc<TradeExecutor>,
        hedging: Arc<HedgingService>,
    ) -> Self {
        let pool = Arc::new(EvaluationPool::new(config.pool_max_workers, 64));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            executor,
            hedging,
            pool,
            sniper_active: AtomicBool::new(false),
            cycle_counter: AtomicU64::new(0),
            in_progress: Arc::new(Mutex::new(HashSet::new())),
            shutdown_tx,
        }
    }

    /// Enable the aggressive path. Idempotent.
    pub fn start_sniper(&self) {
        if !self.sniper_active.swap(true, Ordering::SeqCst) {
            info!("Scheduler: sniper activated");
        }
    }

    /// Disable the aggressive path. Idempotent.
    pub fn stop_sniper(&self) {
        if self.sniper_active.swap(false, Ordering::SeqCst) {
            info!("Scheduler: sniper deactivated");
        }
    }

    pub fn is_sniper_active(&self) -> bool {
        self.sniper_active.load(Ordering::SeqCst)
    }

    /// Whether a tick with this counter value evaluates in this session.
    pub fn should_evaluate(counter: u64, session: MarketSession) -> bool {
        counter % session.scan_interval() == 0
    }

    /// Spawn the three periodic loops. Handles run until `shutdown`.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        {
            let scheduler = Arc::clone(self);
            let mut shutdown_rx = scheduler.shutdown_tx.subscribe();
            let period = Duration::from_millis(scheduler.config.sniper_tick_ms);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => scheduler.sniper_tick(MarketSession::current()).await,
                        _ = shutdown_rx.changed() => break,
                    }
                }
            }));
        }

        {
            let scheduler = Arc::clone(self);
            let mut shutdown_rx = scheduler.shutdown_tx.subscribe();
            let period = Duration::from_millis(scheduler.config.default_tick_ms);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => scheduler.default_tick().await,
                        _ = shutdown_rx.changed() => break,
                    }
                }
            }));
        }

        {
            let scheduler = Arc::clone(self);
            let mut shutdown_rx = scheduler.shutdown_tx.subscribe();
            let period = Duration::from_millis(scheduler.config.hedge_tick_ms);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = scheduler.hedging.run_once().await {
                                error!("Scheduler: hedging tick failed: {:#}", e);
                            }
                        }
                        _ = shutdown_rx.changed() => break,
                    }
                }
            }));
        }

        handles
    }

    /// One sniper tick: bump the cycle counter, apply the session gate,
    /// then fan the symbol list out to the worker pool.
    pub async fn sniper_tick(&self, session: MarketSession) {
        if !self.is_sniper_active() {
            return;
        }

        let counter = self.cycle_counter.fetch_add(1, Ordering::SeqCst) + 1;
        if !Self::should_evaluate(counter, session) {
            debug!(
                "Scheduler: tick {} skipped in {:?} (interval {})",
                counter,
                session,
                session.scan_interval()
            );
            return;
        }

        for symbol in self.config.sniper_symbols.clone() {
            self.dispatch_evaluation(symbol, Exchange::Bybit, SniperStrategy::ID)
                .await;
        }
    }

    /// One default-strategy tick: serial evaluation over its symbols with
    /// per-symbol venue routing.
    pub async fn default_tick(&self) {
        for symbol in self.config.default_symbols.clone() {
            let exchange = self.config.exchange_for(&symbol);
            if let Err(e) = self
                .executor
                .evaluate_and_execute(&symbol, exchange, DefaultStrategy::ID)
                .await
            {
                error!("Scheduler: default evaluation of {} failed: {:#}", symbol, e);
            }
        }
    }

    /// Submit one symbol evaluation to the pool, unless that symbol is
    /// already being evaluated.
    async fn dispatch_evaluation(&self, symbol: String, exchange: Exchange, strategy_id: &str) {
        {
            let mut in_progress = self.in_progress.lock().await;
            if !in_progress.insert(symbol.clone()) {
                debug!("Scheduler: {} evaluation already in flight, skipping", symbol);
                return;
            }
        }

        let executor = Arc::clone(&self.executor);
        let in_progress = Arc::clone(&self.in_progress);
        let strategy_id = strategy_id.to_string();
        let task_symbol = symbol.clone();

        self.pool
            .dispatch(async move {
                if let Err(e) = executor
                    .evaluate_and_execute(&task_symbol, exchange, &strategy_id)
                    .await
                {
                    error!("Scheduler: evaluation of {} failed: {:#}", task_symbol, e);
                }
                in_progress.lock().await.remove(&task_symbol);
            })
            .await;
    }

    /// Stop accepting ticks and drain the pool within the configured
    /// bounded wait.
    pub async fn shutdown(&self) {
        info!("Scheduler: shutting down");
        let _ = self.shutdown_tx.send(true);
        let drained = self
            .pool
            .drain(
                self.config.pool_max_workers,
                Duration::from_secs(self.config.shutdown_drain_secs),
            )
            .await;
        if !drained {
            error!(
                "Scheduler: pool did not drain within {}s",
                self.config.shutdown_drain_secs
            );
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_gate_skips_exact_tick_counts() {
        // Asian session, interval 2: ticks 1,3,5 skip; 2,4,6 run.
        let session = MarketSession::from_utc_hour(3);
        let decisions: Vec<bool> = (1..=6u64)
            .map(|c| StrategyScheduler::should_evaluate(c, session))
            .collect();
        assert_eq!(decisions, vec![false, true, false, true, false, true]);

        // US session runs every tick.
        let session = MarketSession::from_utc_hour(19);
        assert!((1..=4u64).all(|c| StrategyScheduler::should_evaluate(c, session)));

        // Quiet session: exactly interval-1 skips between executions.
        let session = MarketSession::from_utc_hour(23);
        let executed: Vec<u64> = (1..=9u64)
            .filter(|&c| StrategyScheduler::should_evaluate(c, session))
            .collect();
        assert_eq!(executed, vec![3, 6, 9]);
    }
}
