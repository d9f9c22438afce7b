mod account;
mod exchange_id;
mod market;
mod order;
mod order_category;
mod order_status;
mod position;
mod side;
mod time_in_force;

pub use account::{AccountSnapshot, Balance};
pub use exchange_id::ExchangeId;
pub use market::{BookLevel, Kline, OrderBookSnapshot, Ticker};
pub use order::{OpenOrder, OrderHandle, OrderId, OrderSpec, OrderUpdate};
pub use order_category::OrderCategory;
pub use order_status::OrderStatus;
pub use position::{PositionDirection, PositionSnapshot, PositionView};
pub use side::Side;
pub use time_in_force::TimeInForce;
