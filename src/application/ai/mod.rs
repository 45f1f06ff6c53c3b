mod oracle;
pub mod setup_parser;

pub use oracle::{AiOracle, DisabledAiOracle, HttpAiOracle};
pub use setup_parser::{CandidateTrade, TradeSetup};
