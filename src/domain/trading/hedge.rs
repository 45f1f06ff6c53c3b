use crate::domain::trading::types::OrderSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a hedge was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HedgeReason {
    HighUnrealizedLoss,
    MarketRegimeChange,
    AiSignalReversal,
    VolatilitySpike,
    CorrelationRisk,
}

impl fmt::Display for HedgeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HedgeReason::HighUnrealizedLoss => "HIGH_UNREALIZED_LOSS",
            HedgeReason::MarketRegimeChange => "MARKET_REGIME_CHANGE",
            HedgeReason::AiSignalReversal => "AI_SIGNAL_REVERSAL",
            HedgeReason::VolatilitySpike => "VOLATILITY_SPIKE",
            HedgeReason::CorrelationRisk => "CORRELATION_RISK",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HedgeType {
    /// Opposite-direction position in the same symbol.
    DirectOpposite,
    /// Position in a correlated instrument.
    CorrelationHedge,
}

/// A protective position opened against an existing one. References the
/// primary position by symbol only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgePosition {
    pub primary_symbol: String,
    pub hedge_symbol: String,
    pub hedge_side: OrderSide,
    /// Fraction of the primary size mirrored, in (0, 1].
    pub ratio: Decimal,
    /// Base quantity actually opened for the hedge leg.
    pub quantity: Decimal,
    pub reason: HedgeReason,
    pub hedge_type: HedgeType,
    pub trigger_price: Decimal,
    pub opened_at: i64,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_wire_names() {
        assert_eq!(
            HedgeReason::HighUnrealizedLoss.to_string(),
            "HIGH_UNREALIZED_LOSS"
        );
        assert_eq!(
            HedgeReason::VolatilitySpike.to_string(),
            "VOLATILITY_SPIKE"
        );
    }
}
