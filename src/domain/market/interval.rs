use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candlestick intervals supported across the connected venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    OneMin,
    FiveMin,
    FifteenMin,
    OneHour,
    FourHour,
    OneDay,
}

impl Interval {
    pub fn to_minutes(&self) -> usize {
        match self {
            Interval::OneMin => 1,
            Interval::FiveMin => 5,
            Interval::FifteenMin => 15,
            Interval::OneHour => 60,
            Interval::FourHour => 240,
            Interval::OneDay => 1440,
        }
    }

    pub fn to_millis(&self) -> i64 {
        (self.to_minutes() * 60 * 1000) as i64
    }

    /// Bybit V5 kline interval code ("1", "5", "15", "60", "240", "D").
    pub fn to_bybit_code(&self) -> &'static str {
        match self {
            Interval::OneMin => "1",
            Interval::FiveMin => "5",
            Interval::FifteenMin => "15",
            Interval::OneHour => "60",
            Interval::FourHour => "240",
            Interval::OneDay => "D",
        }
    }

    /// MEXC interval string ("1m", "5m", "15m", "60m", "4h", "1d").
    pub fn to_mexc_code(&self) -> &'static str {
        match self {
            Interval::OneMin => "1m",
            Interval::FiveMin => "5m",
            Interval::FifteenMin => "15m",
            Interval::OneHour => "60m",
            Interval::FourHour => "4h",
            Interval::OneDay => "1d",
        }
    }

    /// The fallback interval used after a venue rejects the requested one.
    pub fn fallback() -> Interval {
        Interval::OneDay
    }

    /// Higher timeframes consulted by the multi-timeframe confirmer.
    /// Empty for the daily interval: there is nothing meaningful above it.
    pub fn confirmation_timeframes(&self) -> Vec<Interval> {
        match self {
            Interval::OneMin => vec![Interval::FifteenMin, Interval::OneHour],
            Interval::FiveMin => vec![Interval::OneHour, Interval::FourHour],
            Interval::FifteenMin => vec![Interval::OneHour, Interval::FourHour],
            Interval::OneHour => vec![Interval::FourHour, Interval::OneDay],
            Interval::FourHour => vec![Interval::OneDay],
            Interval::OneDay => vec![],
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Interval::OneMin => "1m",
            Interval::FiveMin => "5m",
            Interval::FifteenMin => "15m",
            Interval::OneHour => "1h",
            Interval::FourHour => "4h",
            Interval::OneDay => "1d",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "1m" => Ok(Interval::OneMin),
            "5m" => Ok(Interval::FiveMin),
            "15m" => Ok(Interval::FifteenMin),
            "1h" | "60m" => Ok(Interval::OneHour),
            "4h" => Ok(Interval::FourHour),
            "1d" => Ok(Interval::OneDay),
            _ => Err(anyhow!("Unknown interval: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_display_parse() {
        for iv in [
            Interval::OneMin,
            Interval::FiveMin,
            Interval::FifteenMin,
            Interval::OneHour,
            Interval::FourHour,
            Interval::OneDay,
        ] {
            assert_eq!(iv.to_string().parse::<Interval>().unwrap(), iv);
        }
    }

    #[test]
    fn test_venue_codes() {
        assert_eq!(Interval::OneHour.to_bybit_code(), "60");
        assert_eq!(Interval::OneHour.to_mexc_code(), "60m");
        assert_eq!(Interval::OneDay.to_bybit_code(), "D");
    }

    #[test]
    fn test_daily_has_no_confirmation_timeframes() {
        assert!(Interval::OneDay.confirmation_timeframes().is_empty());
        assert_eq!(
            Interval::OneHour.confirmation_timeframes(),
            vec![Interval::FourHour, Interval::OneDay]
        );
    }
}
