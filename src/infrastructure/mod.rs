pub mod bybit;
pub mod http_client_factory;
pub mod mexc;
pub mod persistence;
pub mod repositories;
