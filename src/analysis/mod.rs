pub mod fibonacci;
pub mod indicators;
pub mod pivots;
pub mod volume;

pub use pivots::{SrKind, SrLevel};
