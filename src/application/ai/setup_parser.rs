//! Parser for the structured trade setups an AI scan can emit alongside
//! its prose:
//!
//! ```text
//! ---SETUP---
//! Title: BTC range break
//! Direction: LONG
//! Entry: 64000 - 64200
//! StopLoss: 63000
//! TakeProfit1: 66000
//! TakeProfit2: 68000
//! ---END_SETUP---
//! ```
//!
//! Each take-profit line spawns a distinct candidate trade.

use crate::domain::trading::types::OrderSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

const BLOCK_START: &str = "---SETUP---";
const BLOCK_END: &str = "---END_SETUP---";

/// One parsed setup block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSetup {
    pub title: String,
    pub side: OrderSide,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profits: Vec<Decimal>,
}

/// A single candidate trade derived from a setup: one take-profit each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTrade {
    pub title: String,
    pub side: OrderSide,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// 1-based index of the originating TakeProfit line.
    pub tp_index: usize,
}

impl TradeSetup {
    pub fn candidate_trades(&self) -> Vec<CandidateTrade> {
        self.take_profits
            .iter()
            .enumerate()
            .map(|(i, &tp)| CandidateTrade {
                title: self.title.clone(),
                side: self.side,
                entry: self.entry,
                stop_loss: self.stop_loss,
                take_profit: tp,
                tp_index: i + 1,
            })
            .collect()
    }

    /// Reserialize as a setup block. Parsing the result yields the same
    /// candidate trades.
    pub fn to_block(&self) -> String {
        let mut out = String::new();
        out.push_str(BLOCK_START);
        out.push('\n');
        out.push_str(&format!("Title: {}\n", self.title));
        out.push_str(&format!(
            "Direction: {}\n",
            match self.side {
                OrderSide::Buy => "LONG",
                OrderSide::Sell => "SHORT",
            }
        ));
        out.push_str(&format!("Entry: {}\n", self.entry));
        out.push_str(&format!("StopLoss: {}\n", self.stop_loss));
        for (i, tp) in self.take_profits.iter().enumerate() {
            out.push_str(&format!("TakeProfit{}: {}\n", i + 1, tp));
        }
        out.push_str(BLOCK_END);
        out
    }
}

/// Extract every well-formed setup block from a scan response. Malformed
/// blocks are logged and skipped; the rest of the text is ignored.
pub fn parse_setups(text: &str) -> Vec<TradeSetup> {
    let mut setups = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(BLOCK_START) {
        let after_start = &rest[start + BLOCK_START.len()..];
        let Some(end) = after_start.find(BLOCK_END) else {
            break;
        };
        let body = &after_start[..end];
        match parse_block(body) {
            Some(setup) => setups.push(setup),
            None => debug!("setup block skipped: missing required fields"),
        }
        rest = &after_start[end + BLOCK_END.len()..];
    }

    setups
}

fn parse_block(body: &str) -> Option<TradeSetup> {
    let mut title = None;
    let mut side = None;
    let mut entry = None;
    let mut stop_loss = None;
    // (index, price) pairs; sorted at the end so out-of-order lines still
    // land in TP order.
    let mut take_profits: Vec<(usize, Decimal)> = Vec::new();

    for line in body.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "Title" => title = Some(value.to_string()),
            "Direction" => {
                side = match value.to_uppercase().as_str() {
                    "LONG" => Some(OrderSide::Buy),
                    "SHORT" => Some(OrderSide::Sell),
                    _ => None,
                }
            }
            "Entry" => entry = parse_scalar_or_range(value),
            "StopLoss" => stop_loss = parse_scalar_or_range(value),
            _ if key.starts_with("TakeProfit") => {
                let index: usize = key["TakeProfit".len()..].parse().unwrap_or(0);
                if index > 0 {
                    if let Some(price) = parse_scalar_or_range(value) {
                        take_profits.push((index, price));
                    }
                }
            }
            _ => {}
        }
    }

    take_profits.sort_by_key(|(i, _)| *i);

    Some(TradeSetup {
        title: title?,
        side: side?,
        entry: entry?,
        stop_loss: stop_loss?,
        take_profits: take_profits.into_iter().map(|(_, p)| p).collect(),
    })
}

/// "64000" or "64000 - 64200"; ranges resolve to their first value.
fn parse_scalar_or_range(value: &str) -> Option<Decimal> {
    let first = value.split('-').next()?.trim();
    Decimal::from_str(first).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = "\
Some preamble from the model.

---SETUP---
Title: BTC range break
Direction: LONG
Entry: 64000 - 64200
StopLoss: 63000
TakeProfit1: 66000
TakeProfit2: 68000
TakeProfit3: 70000
---END_SETUP---

Closing commentary.";

    #[test]
    fn test_parse_single_block() {
        let setups = parse_setups(SAMPLE);
        assert_eq!(setups.len(), 1);
        let s = &setups[0];
        assert_eq!(s.title, "BTC range break");
        assert_eq!(s.side, OrderSide::Buy);
        // Range resolves to its first value.
        assert_eq!(s.entry, dec!(64000));
        assert_eq!(s.stop_loss, dec!(63000));
        assert_eq!(s.take_profits, vec![dec!(66000), dec!(68000), dec!(70000)]);
    }

    #[test]
    fn test_each_tp_spawns_a_candidate() {
        let setups = parse_setups(SAMPLE);
        let candidates = setups[0].candidate_trades();
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].tp_index, 1);
        assert_eq!(candidates[0].take_profit, dec!(66000));
        assert_eq!(candidates[2].take_profit, dec!(70000));
        // All candidates share entry and stop.
        assert!(candidates
            .iter()
            .all(|c| c.entry == dec!(64000) && c.stop_loss == dec!(63000)));
    }

    #[test]
    fn test_reserialize_roundtrip() {
        let setups = parse_setups(SAMPLE);
        let block = setups[0].to_block();
        let reparsed = parse_setups(&block);
        assert_eq!(reparsed, setups);
        assert_eq!(
            reparsed[0].candidate_trades(),
            setups[0].candidate_trades()
        );
    }

    #[test]
    fn test_short_direction() {
        let text = "---SETUP---\nTitle: ETH fade\nDirection: SHORT\nEntry: 3000\nStopLoss: 3100\nTakeProfit1: 2800\n---END_SETUP---";
        let setups = parse_setups(text);
        assert_eq!(setups[0].side, OrderSide::Sell);
    }

    #[test]
    fn test_malformed_block_skipped() {
        let text = "---SETUP---\nTitle: incomplete\nDirection: LONG\n---END_SETUP---";
        assert!(parse_setups(text).is_empty());
    }

    #[test]
    fn test_multiple_blocks() {
        let text = format!("{}\n{}", SAMPLE, SAMPLE.replace("LONG", "SHORT"));
        assert_eq!(parse_setups(&text).len(), 2);
    }
}
