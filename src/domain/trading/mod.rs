mod hedge;
mod position;
pub mod types;

pub use hedge::{HedgePosition, HedgeReason, HedgeType};
pub use position::PositionUpdateData;
pub use types::{
    Exchange, MarketType, Order, OrderRequest, OrderSide, OrderStatus, OrderType,
};
