mod confirmation;
mod performance;
mod tier;
mod verdict;

pub use confirmation::MtfConfirmation;
pub use performance::{SignalOutcome, SignalPerformance};
pub use tier::{SignalKind, SignalTier};
pub use verdict::AiVerdict;
