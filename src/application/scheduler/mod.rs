mod executor;
mod pool;
#[allow(clippy::module_inception)]
mod scheduler;

pub use executor::TradeExecutor;
pub use pool::{DispatchMode, EvaluationPool};
pub use scheduler::StrategyScheduler;
