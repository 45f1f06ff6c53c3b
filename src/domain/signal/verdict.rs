use crate::domain::trading::types::OrderSide;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional verdict extracted from the AI analyzer's free-form answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiVerdict {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl AiVerdict {
    /// Scan the response text for the first recognized verdict token.
    /// The strong variants are matched before the plain ones so that
    /// "STRONG_BUY" is not mistaken for "BUY". Returns None when no token
    /// is present — callers treat that as no confirmation.
    pub fn parse(text: &str) -> Option<AiVerdict> {
        let upper = text.to_uppercase();
        // Token => verdict, ordered by specificity.
        const TOKENS: &[(&str, AiVerdict)] = &[
            ("STRONG_BUY", AiVerdict::StrongBuy),
            ("STRONG BUY", AiVerdict::StrongBuy),
            ("STRONG_SELL", AiVerdict::StrongSell),
            ("STRONG SELL", AiVerdict::StrongSell),
            ("NEUTRAL", AiVerdict::Neutral),
            ("BUY", AiVerdict::Buy),
            ("SELL", AiVerdict::Sell),
        ];
        let mut best: Option<(usize, AiVerdict)> = None;
        for (token, verdict) in TOKENS {
            if let Some(pos) = upper.find(token) {
                let replace = match best {
                    None => true,
                    Some((best_pos, _)) => pos < best_pos,
                };
                if replace {
                    best = Some((pos, *verdict));
                }
            }
        }
        best.map(|(_, v)| v)
    }

    /// Whether the verdict points the same way as the intended trade side.
    pub fn aligns_with(&self, side: OrderSide) -> bool {
        match (self, side) {
            (AiVerdict::StrongBuy | AiVerdict::Buy, OrderSide::Buy) => true,
            (AiVerdict::StrongSell | AiVerdict::Sell, OrderSide::Sell) => true,
            _ => false,
        }
    }

    /// Whether the verdict points against the trade side (used by the
    /// hedging reversal trigger). Neutral opposes nothing.
    pub fn opposes(&self, side: OrderSide) -> bool {
        match (self, side) {
            (AiVerdict::StrongSell | AiVerdict::Sell, OrderSide::Buy) => true,
            (AiVerdict::StrongBuy | AiVerdict::Buy, OrderSide::Sell) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AiVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AiVerdict::StrongBuy => "STRONG_BUY",
            AiVerdict::Buy => "BUY",
            AiVerdict::Neutral => "NEUTRAL",
            AiVerdict::Sell => "SELL",
            AiVerdict::StrongSell => "STRONG_SELL",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefers_specific_tokens() {
        assert_eq!(
            AiVerdict::parse("Verdict: STRONG_BUY based on momentum"),
            Some(AiVerdict::StrongBuy)
        );
        assert_eq!(AiVerdict::parse("I would BUY here"), Some(AiVerdict::Buy));
        assert_eq!(
            AiVerdict::parse("strong sell, downtrend intact"),
            Some(AiVerdict::StrongSell)
        );
    }

    #[test]
    fn test_parse_picks_earliest_token() {
        // The analyzer sometimes enumerates options; the first stated
        // verdict wins.
        assert_eq!(
            AiVerdict::parse("SELL. Do not BUY until reversal confirms."),
            Some(AiVerdict::Sell)
        );
    }

    #[test]
    fn test_parse_failure_returns_none() {
        assert_eq!(AiVerdict::parse("the market looks undecided"), None);
        assert_eq!(AiVerdict::parse(""), None);
    }

    #[test]
    fn test_alignment_and_opposition() {
        assert!(AiVerdict::StrongBuy.aligns_with(OrderSide::Buy));
        assert!(!AiVerdict::Neutral.aligns_with(OrderSide::Buy));
        assert!(!AiVerdict::Sell.aligns_with(OrderSide::Buy));
        assert!(AiVerdict::Sell.opposes(OrderSide::Buy));
        assert!(AiVerdict::Buy.opposes(OrderSide::Sell));
        assert!(!AiVerdict::Neutral.opposes(OrderSide::Sell));
    }
}
