mod cache;
mod state_machine;

pub use cache::PositionCache;
pub use state_machine::{ManagementStyle, PositionStateMachine, TickOutcome};
