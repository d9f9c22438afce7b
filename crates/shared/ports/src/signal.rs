use argus_core::Price;

/// Prices available to a signal at decision time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketHistory {
    /// Closed candle closes, oldest first
    pub closes: Vec<Price>,
    /// Latest traded price
    pub price: Price,
    /// Price seen at the previous decision tick
    pub previous_price: Option<Price>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

/// Price crossed the reference line since the previous tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalOutput {
    pub trend: Trend,
    pub cross: Option<Cross>,
}

impl SignalOutput {
    pub fn neutral() -> Self {
        Self { trend: Trend::Flat, cross: None }
    }
}

/// Pure indicator function. No I/O, no state mutation.
pub trait Signal: Send + Sync {
    fn name(&self) -> &str;

    fn decide(&self, history: &MarketHistory) -> SignalOutput;
}
