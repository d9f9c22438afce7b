use serde::{Deserialize, Serialize};

/// Order category tag.
///
/// The execution engine allows exactly one in-flight order per category per
/// (exchange, symbol) at any time, so the category is also the lock key
/// granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderCategory {
    /// Execute at current market price
    Market,
    /// Execute at specified price or better
    Limit,
    /// Market order triggered when price reaches stop price
    Stop,
    /// Stop whose trigger follows the price by a callback rate
    TrailingStop,
}

impl OrderCategory {
    pub const ALL: [OrderCategory; 4] = [
        OrderCategory::Market,
        OrderCategory::Limit,
        OrderCategory::Stop,
        OrderCategory::TrailingStop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderCategory::Market => "MARKET",
            OrderCategory::Limit => "LIMIT",
            OrderCategory::Stop => "STOP",
            OrderCategory::TrailingStop => "TRAILING_STOP",
        }
    }

    /// Returns true if orders of this category rest on the exchange until triggered or filled
    pub fn is_resting(&self) -> bool {
        !matches!(self, OrderCategory::Market)
    }
}

impl std::fmt::Display for OrderCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
