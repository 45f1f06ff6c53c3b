use serde::{Deserialize, Serialize};

/// Outcome of the higher-timeframe confirmation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MtfConfirmation {
    StrongConfirmation,
    Weak,
    None,
    Contradiction,
    /// The primary interval has no meaningful higher timeframe.
    NotApplicable,
    Error,
}

impl MtfConfirmation {
    /// Scalar applied to the confluence score.
    pub fn score_adjustment(&self) -> f64 {
        match self {
            MtfConfirmation::StrongConfirmation => 0.75,
            MtfConfirmation::Weak => 0.25,
            MtfConfirmation::None => 0.0,
            MtfConfirmation::Contradiction => -1.0,
            MtfConfirmation::NotApplicable => 0.0,
            MtfConfirmation::Error => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_adjustments() {
        assert_eq!(MtfConfirmation::StrongConfirmation.score_adjustment(), 0.75);
        assert_eq!(MtfConfirmation::Weak.score_adjustment(), 0.25);
        assert_eq!(MtfConfirmation::Contradiction.score_adjustment(), -1.0);
        assert_eq!(MtfConfirmation::Error.score_adjustment(), 0.0);
    }
}
