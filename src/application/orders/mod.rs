mod order_manager;

pub use order_manager::{round_down_to_step, OrderManager};
