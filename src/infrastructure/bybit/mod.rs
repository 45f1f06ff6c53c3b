//! Bybit V5 adapter: normalized market data, authenticated order flow,
//! and the private position stream.

mod adapter;
pub mod common;
mod private_ws;

pub use adapter::BybitAdapter;
pub use private_ws::BybitPrivateStream;
