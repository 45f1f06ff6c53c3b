use chrono::{Timelike, Utc};
use serde::{Deserialize, Serialize};

/// UTC-hour market session bucket. Determines how often the aggressive
/// scanner actually evaluates symbols relative to its fixed tick rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketSession {
    Asian,
    OverlapAsiaEurope,
    European,
    OverlapEuropeUs,
    Us,
    Quiet,
}

impl MarketSession {
    /// Classify a UTC hour (0..=23) into a session bucket.
    pub fn from_utc_hour(hour: u32) -> MarketSession {
        match hour {
            0..=6 => MarketSession::Asian,
            7..=8 => MarketSession::OverlapAsiaEurope,
            9..=12 => MarketSession::European,
            13..=16 => MarketSession::OverlapEuropeUs,
            17..=21 => MarketSession::Us,
            _ => MarketSession::Quiet,
        }
    }

    /// Session for the current wall-clock instant.
    pub fn current() -> MarketSession {
        MarketSession::from_utc_hour(Utc::now().hour())
    }

    /// Scan interval in scheduler ticks. A cycle counter increments every
    /// tick; evaluation runs only when `counter % interval == 0`, so exactly
    /// `interval - 1` ticks are skipped between executions.
    pub fn scan_interval(&self) -> u64 {
        match self {
            MarketSession::OverlapEuropeUs => 1,
            MarketSession::Us => 1,
            MarketSession::European => 1,
            MarketSession::OverlapAsiaEurope => 2,
            MarketSession::Asian => 2,
            MarketSession::Quiet => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_classification() {
        assert_eq!(MarketSession::from_utc_hour(3), MarketSession::Asian);
        assert_eq!(
            MarketSession::from_utc_hour(7),
            MarketSession::OverlapAsiaEurope
        );
        assert_eq!(MarketSession::from_utc_hour(10), MarketSession::European);
        assert_eq!(
            MarketSession::from_utc_hour(14),
            MarketSession::OverlapEuropeUs
        );
        assert_eq!(MarketSession::from_utc_hour(19), MarketSession::Us);
        assert_eq!(MarketSession::from_utc_hour(23), MarketSession::Quiet);
    }

    #[test]
    fn test_scan_intervals() {
        assert_eq!(MarketSession::OverlapEuropeUs.scan_interval(), 1);
        assert_eq!(MarketSession::Asian.scan_interval(), 2);
        assert_eq!(MarketSession::Quiet.scan_interval(), 3);
    }

    #[test]
    fn test_asian_session_skips_alternate_ticks() {
        // Counter increments first, then the modulo gate runs. With an
        // interval of 2, ticks 2, 4, 6 evaluate and 1, 3, 5 skip.
        let interval = MarketSession::from_utc_hour(3).scan_interval();
        let executed: Vec<u64> = (1..=6u64).filter(|c| c % interval == 0).collect();
        assert_eq!(executed, vec![2, 4, 6]);
    }
}
