use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::values::{Price, Quantity, Symbol, Timestamp};

/// A single price level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub quantity: Quantity,
}

impl BookLevel {
    pub fn new(price: Price, quantity: Quantity) -> Self {
        Self { price, quantity }
    }
}

/// Top-N levels of one book, replaced wholesale on every push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub symbol: Symbol,
    /// Best first (descending price)
    pub bids: Vec<BookLevel>,
    /// Best first (ascending price)
    pub asks: Vec<BookLevel>,
    pub timestamp: Timestamp,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    /// Both sides of the top of book, if present
    pub fn top(&self) -> Option<(Price, Price)> {
        Some((self.best_bid()?, self.best_ask()?))
    }

    pub fn mid_price(&self) -> Option<Price> {
        let (bid, ask) = self.top()?;
        Some((bid + ask) / Decimal::TWO)
    }

    /// Keep at most `depth` levels per side
    pub fn truncated(mut self, depth: usize) -> Self {
        self.bids.truncate(depth);
        self.asks.truncate(depth);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: Symbol,
    pub last_price: Price,
    pub timestamp: Timestamp,
}

/// One candlestick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: Timestamp,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
    /// False while the candle is still forming
    pub closed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_top_of_book() {
        let book = OrderBookSnapshot {
            symbol: "BTCUSDT".into(),
            bids: vec![BookLevel::new(dec!(100), dec!(1)), BookLevel::new(dec!(99), dec!(2))],
            asks: vec![BookLevel::new(dec!(101), dec!(1))],
            timestamp: Utc::now(),
        };
        assert_eq!(book.top(), Some((dec!(100), dec!(101))));
        assert_eq!(book.mid_price(), Some(dec!(100.5)));
        assert_eq!(book.clone().truncated(1).bids.len(), 1);
    }

    #[test]
    fn test_one_sided_book_has_no_top() {
        let book = OrderBookSnapshot {
            symbol: "BTCUSDT".into(),
            bids: vec![BookLevel::new(dec!(100), dec!(1))],
            asks: vec![],
            timestamp: Utc::now(),
        };
        assert_eq!(book.top(), None);
        assert_eq!(book.mid_price(), None);
    }
}
