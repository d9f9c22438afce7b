//! Reference SMA-cross signal
//!
//! Simple moving average over the last `period` candle closes. The trend is
//! where the price sits relative to the average; a cross is reported when the
//! previous tick's price was on the other side.

use argus_core::Price;
use argus_ports::{Cross, MarketHistory, Signal, SignalOutput, Trend};
use rust_decimal::Decimal;

pub const DEFAULT_SMA_PERIOD: usize = 30;

#[derive(Debug, Clone)]
pub struct SmaCrossSignal {
    period: usize,
}

impl SmaCrossSignal {
    pub fn new(period: usize) -> Self {
        Self { period: period.max(1) }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// None until `period` closes are available
    pub fn sma(&self, closes: &[Price]) -> Option<Price> {
        if closes.len() < self.period {
            return None;
        }
        let window = &closes[closes.len() - self.period..];
        let sum: Decimal = window.iter().sum();
        Some(sum / Decimal::from(self.period))
    }
}

impl Default for SmaCrossSignal {
    fn default() -> Self {
        Self::new(DEFAULT_SMA_PERIOD)
    }
}

impl Signal for SmaCrossSignal {
    fn name(&self) -> &str {
        "sma-cross"
    }

    fn decide(&self, history: &MarketHistory) -> SignalOutput {
        let Some(sma) = self.sma(&history.closes) else {
            return SignalOutput::neutral();
        };

        let price = history.price;
        let trend = if price > sma {
            Trend::Up
        } else if price < sma {
            Trend::Down
        } else {
            Trend::Flat
        };

        let cross = history.previous_price.and_then(|prev| {
            if prev < sma && price > sma {
                Some(Cross::Above)
            } else if prev > sma && price < sma {
                Some(Cross::Below)
            } else {
                None
            }
        });

        SignalOutput { trend, cross }
    }
}
