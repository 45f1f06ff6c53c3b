//! Adaptive component weights for signal scoring, derived from the
//! recorded outcomes of past signals.

use crate::domain::ports::SignalPerformanceRepository;
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// Minimum decided outcomes before the defaults start adapting.
const MIN_SAMPLE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentWeights {
    pub technical: f64,
    pub sentiment: f64,
    pub ai: f64,
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            technical: 0.5,
            sentiment: 0.2,
            ai: 0.3,
        }
    }
}

impl ComponentWeights {
    fn normalized(self) -> Self {
        let sum = self.technical + self.sentiment + self.ai;
        if sum <= 0.0 {
            return Self::default();
        }
        Self {
            technical: self.technical / sum,
            sentiment: self.sentiment / sum,
            ai: self.ai / sum,
        }
    }
}

pub struct SignalWeightingService {
    performance_repository: Arc<dyn SignalPerformanceRepository>,
}

impl SignalWeightingService {
    pub fn new(performance_repository: Arc<dyn SignalPerformanceRepository>) -> Self {
        Self {
            performance_repository,
        }
    }

    /// Current weights. With too little history the defaults are returned;
    /// otherwise the AI weight shifts with the spread between AI-confirmed
    /// and unconfirmed win rates, and the result is renormalized.
    pub async fn weights(&self) -> Result<ComponentWeights> {
        let records = self.performance_repository.all().await?;
        let decided: Vec<_> = records
            .iter()
            .filter(|r| !matches!(r.outcome, crate::domain::signal::SignalOutcome::Breakeven))
            .collect();

        if decided.len() < MIN_SAMPLE {
            return Ok(ComponentWeights::default());
        }

        let win_rate = |confirmed: bool| -> Option<f64> {
            let subset: Vec<_> = decided.iter().filter(|r| r.ai_confirmed == confirmed).collect();
            if subset.is_empty() {
                return None;
            }
            let wins = subset.iter().filter(|r| r.is_win()).count();
            Some(wins as f64 / subset.len() as f64)
        };

        let mut weights = ComponentWeights::default();
        if let (Some(with_ai), Some(without_ai)) = (win_rate(true), win_rate(false)) {
            // Shift up to +/-0.15 of weight toward whichever side earns it.
            let edge = (with_ai - without_ai).clamp(-0.3, 0.3) * 0.5;
            weights.ai += edge;
            weights.technical -= edge;
            debug!(
                "SignalWeighting: ai win rate {:.2} vs {:.2}, edge {:.3}",
                with_ai, without_ai, edge
            );
        }

        Ok(weights.normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::{SignalOutcome, SignalPerformance};
    use crate::infrastructure::repositories::InMemorySignalPerformanceRepository;

    fn record(ai_confirmed: bool, outcome: SignalOutcome) -> SignalPerformance {
        SignalPerformance {
            signal_id: uuid::Uuid::new_v4().to_string(),
            symbol: "BTCUSDT".to_string(),
            tier: "TIER_1_BREAKOUT_BUY".to_string(),
            outcome,
            technical_score: 4.0,
            ai_confirmed,
            mtf_adjustment: 0.0,
            recorded_at: 0,
        }
    }

    #[tokio::test]
    async fn test_defaults_below_sample_threshold() {
        let repo = Arc::new(InMemorySignalPerformanceRepository::new());
        let service = SignalWeightingService::new(repo.clone());
        repo.record(&record(true, SignalOutcome::Win)).await.unwrap();
        assert_eq!(service.weights().await.unwrap(), ComponentWeights::default());
    }

    #[tokio::test]
    async fn test_ai_edge_shifts_weight() {
        let repo = Arc::new(InMemorySignalPerformanceRepository::new());
        let service = SignalWeightingService::new(repo.clone());

        // AI-confirmed signals win, unconfirmed lose.
        for _ in 0..15 {
            repo.record(&record(true, SignalOutcome::Win)).await.unwrap();
            repo.record(&record(false, SignalOutcome::Loss)).await.unwrap();
        }

        let weights = service.weights().await.unwrap();
        assert!(weights.ai > ComponentWeights::default().ai);
        assert!(weights.technical < ComponentWeights::default().technical);
        let sum = weights.technical + weights.sentiment + weights.ai;
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
