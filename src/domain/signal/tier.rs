use crate::domain::trading::types::OrderSide;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the signal was formed: a structural event or pure confluence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Breakout,
    Rejection,
    Confluence,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalKind::Breakout => "BREAKOUT",
            SignalKind::Rejection => "REJECTION",
            SignalKind::Confluence => "CONFLUENCE",
        };
        write!(f, "{}", s)
    }
}

/// Graded signal confidence. The tier maps to the risk fraction and
/// leverage used by the sizer; the string form encodes kind and side
/// (e.g. `TIER_1_BREAKOUT_BUY`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalTier {
    NoSignal,
    Graded {
        tier: u8,
        kind: SignalKind,
        side: OrderSide,
    },
}

impl SignalTier {
    pub fn graded(tier: u8, kind: SignalKind, side: OrderSide) -> Self {
        debug_assert!((1..=3).contains(&tier));
        SignalTier::Graded { tier, kind, side }
    }

    pub fn is_signal(&self) -> bool {
        !matches!(self, SignalTier::NoSignal)
    }

    pub fn side(&self) -> Option<OrderSide> {
        match self {
            SignalTier::NoSignal => None,
            SignalTier::Graded { side, .. } => Some(*side),
        }
    }

    /// Risk fraction of account equity committed per trade.
    pub fn risk_fraction(&self) -> Decimal {
        match self {
            SignalTier::Graded { tier: 1, .. } => dec!(0.015),
            SignalTier::Graded { tier: 2, .. } => dec!(0.0075),
            SignalTier::Graded { tier: 3, .. } => dec!(0.004),
            _ => Decimal::ZERO,
        }
    }

    /// Leverage applied at entry. Lower-confidence tiers risk less equity
    /// at higher leverage.
    pub fn leverage(&self) -> u32 {
        match self {
            SignalTier::Graded { tier: 1, .. } => 25,
            SignalTier::Graded { tier: 2, .. } => 40,
            SignalTier::Graded { tier: 3, .. } => 75,
            _ => 1,
        }
    }
}

impl fmt::Display for SignalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalTier::NoSignal => write!(f, "NO_SIGNAL"),
            SignalTier::Graded { tier, kind, side } => {
                write!(f, "TIER_{}_{}_{}", tier, kind, side)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_string_encodes_kind_and_side() {
        let t = SignalTier::graded(1, SignalKind::Breakout, OrderSide::Buy);
        assert_eq!(t.to_string(), "TIER_1_BREAKOUT_BUY");

        let t = SignalTier::graded(3, SignalKind::Confluence, OrderSide::Sell);
        assert_eq!(t.to_string(), "TIER_3_CONFLUENCE_SELL");

        assert_eq!(SignalTier::NoSignal.to_string(), "NO_SIGNAL");
    }

    #[test]
    fn test_tier_risk_and_leverage_table() {
        let t1 = SignalTier::graded(1, SignalKind::Breakout, OrderSide::Buy);
        let t2 = SignalTier::graded(2, SignalKind::Rejection, OrderSide::Buy);
        let t3 = SignalTier::graded(3, SignalKind::Confluence, OrderSide::Sell);

        assert_eq!(t1.risk_fraction(), dec!(0.015));
        assert_eq!(t1.leverage(), 25);
        assert_eq!(t2.risk_fraction(), dec!(0.0075));
        assert_eq!(t2.leverage(), 40);
        assert_eq!(t3.risk_fraction(), dec!(0.004));
        assert_eq!(t3.leverage(), 75);
        assert_eq!(SignalTier::NoSignal.risk_fraction(), Decimal::ZERO);
    }

    #[test]
    fn test_no_signal_has_no_side() {
        assert_eq!(SignalTier::NoSignal.side(), None);
        assert_eq!(
            SignalTier::graded(2, SignalKind::Breakout, OrderSide::Sell).side(),
            Some(OrderSide::Sell)
        );
    }
}
