use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalOutcome {
    Win,
    Loss,
    Breakeven,
}

impl SignalOutcome {
    /// Classify a realized P/L fraction. Anything inside +/-0.1% of entry
    /// counts as breakeven.
    pub fn from_pnl_pct(pnl_pct: rust_decimal::Decimal) -> SignalOutcome {
        let epsilon = rust_decimal::Decimal::new(1, 3); // 0.001
        if pnl_pct > epsilon {
            SignalOutcome::Win
        } else if pnl_pct < -epsilon {
            SignalOutcome::Loss
        } else {
            SignalOutcome::Breakeven
        }
    }
}

impl fmt::Display for SignalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalOutcome::Win => "WIN",
            SignalOutcome::Loss => "LOSS",
            SignalOutcome::Breakeven => "BREAKEVEN",
        };
        write!(f, "{}", s)
    }
}

/// Append-only record of how a signal played out, written when the
/// position closes. Feeds the adaptive weighting service and the
/// per-symbol win-rate statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalPerformance {
    pub signal_id: String,
    pub symbol: String,
    pub tier: String,
    pub outcome: SignalOutcome,
    /// Raw technical confluence score at entry.
    pub technical_score: f64,
    pub ai_confirmed: bool,
    pub mtf_adjustment: f64,
    pub recorded_at: i64,
}

impl SignalPerformance {
    pub fn is_win(&self) -> bool {
        matches!(self.outcome, SignalOutcome::Win)
    }
}
