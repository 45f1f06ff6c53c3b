mod risk_manager;

pub use risk_manager::{atr_or_percent_stop, tiered_position_size, RiskManager, WinStats};
