use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderCategory, OrderStatus, Side, TimeInForce};
use crate::values::{Price, Quantity, Symbol, Timestamp};

/// Exchange-assigned order identifier
pub type OrderId = String;

/// What a strategy asks the controller to place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub symbol: Symbol,
    pub side: Side,
    pub category: OrderCategory,
    pub quantity: Quantity,
    /// Required for Limit orders
    pub price: Option<Price>,
    /// Required for Stop orders; activation price for TrailingStop
    pub stop_price: Option<Price>,
    /// TrailingStop callback rate, in percent
    pub callback_rate: Option<Decimal>,
    pub reduce_only: bool,
    pub time_in_force: TimeInForce,
}

impl OrderSpec {
    pub fn market(symbol: impl Into<Symbol>, side: Side, quantity: Quantity) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            category: OrderCategory::Market,
            quantity,
            price: None,
            stop_price: None,
            callback_rate: None,
            reduce_only: false,
            time_in_force: TimeInForce::GTC,
        }
    }

    pub fn limit(
        symbol: impl Into<Symbol>,
        side: Side,
        quantity: Quantity,
        price: Price,
        time_in_force: TimeInForce,
    ) -> Self {
        Self {
            category: OrderCategory::Limit,
            price: Some(price),
            time_in_force,
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Stop-market order; always reduce-only since it only ever protects a position
    pub fn stop(symbol: impl Into<Symbol>, side: Side, quantity: Quantity, stop_price: Price) -> Self {
        Self {
            category: OrderCategory::Stop,
            stop_price: Some(stop_price),
            reduce_only: true,
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn trailing_stop(
        symbol: impl Into<Symbol>,
        side: Side,
        quantity: Quantity,
        activation_price: Price,
        callback_rate: Decimal,
    ) -> Self {
        Self {
            category: OrderCategory::TrailingStop,
            stop_price: Some(activation_price),
            callback_rate: Some(callback_rate),
            reduce_only: true,
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Mark this order reduce-only
    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}

/// Exchange acknowledgement of a created order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHandle {
    pub order_id: OrderId,
    pub client_order_id: Option<String>,
    pub created_at: Timestamp,
}

/// An order currently resting on the exchange, as reported by it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub category: OrderCategory,
    pub price: Option<Price>,
    pub stop_price: Option<Price>,
    pub quantity: Quantity,
    pub reduce_only: bool,
    pub status: OrderStatus,
    /// Exchange creation time
    pub created_at: Timestamp,
    /// Exchange last-update time, when the venue reports one
    pub updated_at: Option<Timestamp>,
}

impl OpenOrder {
    /// Timestamp used to rank duplicates: last update if known, else creation
    pub fn recency(&self) -> Timestamp {
        self.updated_at.unwrap_or(self.created_at)
    }
}

/// A single order status change pushed by (or polled from) the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub status: OrderStatus,
    pub filled_qty: Quantity,
    pub avg_price: Option<Price>,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_protective_orders_are_reduce_only() {
        let stop = OrderSpec::stop("BTCUSDT", Side::Sell, dec!(0.01), dec!(95));
        assert!(stop.reduce_only);
        assert_eq!(stop.category, OrderCategory::Stop);

        let trailing = OrderSpec::trailing_stop("BTCUSDT", Side::Sell, dec!(0.01), dec!(120), dec!(0.2));
        assert!(trailing.reduce_only);
        assert_eq!(trailing.callback_rate, Some(dec!(0.2)));

        let market = OrderSpec::market("BTCUSDT", Side::Buy, dec!(0.01));
        assert!(!market.reduce_only);
        assert!(market.reduce_only().reduce_only);
    }

    #[test]
    fn test_recency_prefers_update_time() {
        let created = Utc::now();
        let mut order = OpenOrder {
            order_id: "1".into(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            category: OrderCategory::Limit,
            price: Some(dec!(100)),
            stop_price: None,
            quantity: dec!(1),
            reduce_only: false,
            status: OrderStatus::New,
            created_at: created,
            updated_at: None,
        };
        assert_eq!(order.recency(), created);

        let later = created + Duration::seconds(5);
        order.updated_at = Some(later);
        assert_eq!(order.recency(), later);
    }
}
