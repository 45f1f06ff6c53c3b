mod service;

pub use service::{evaluate_triggers, HedgingService, TriggerInputs};
