//! Order Value Objects
//!
//! Enumerations shared by every advanced order variant and by broker legs.

mod leg_state;
mod order_side;
mod order_status;
mod order_type;
mod time_in_force;

pub use leg_state::LegState;
pub use order_side::OrderSide;
pub use order_status::OrderStatus;
pub use order_type::OrderType;
pub use time_in_force::TimeInForce;
