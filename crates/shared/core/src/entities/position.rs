use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;
use crate::values::{Price, Quantity, Symbol};

/// Direction of a held position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PositionDirection {
    /// Long position - bought the asset, profit when price rises
    Long,
    /// Short position - sold borrowed asset, profit when price falls
    Short,
    /// Flat
    #[default]
    None,
}

/// Exchange-reported position. `quantity` is signed: negative means short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: Symbol,
    pub quantity: Quantity,
    pub entry_price: Price,
    pub unrealized_pnl: Decimal,
}

/// The engine's belief about one (exchange, symbol) position.
///
/// Rebuilt from every authoritative snapshot; carries no identity across polls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub symbol: Symbol,
    pub direction: PositionDirection,
    pub entry_price: Price,
    /// Always non-negative
    pub quantity: Quantity,
    pub unrealized_pnl: Decimal,
}

impl PositionView {
    /// No position held
    pub fn flat(symbol: impl Into<Symbol>) -> Self {
        Self {
            symbol: symbol.into(),
            direction: PositionDirection::None,
            entry_price: Decimal::ZERO,
            quantity: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
        }
    }

    pub fn from_snapshot(snapshot: &PositionSnapshot) -> Self {
        let direction = if snapshot.quantity > Decimal::ZERO {
            PositionDirection::Long
        } else if snapshot.quantity < Decimal::ZERO {
            PositionDirection::Short
        } else {
            return Self::flat(snapshot.symbol.clone());
        };

        Self {
            symbol: snapshot.symbol.clone(),
            direction,
            entry_price: snapshot.entry_price,
            quantity: snapshot.quantity.abs(),
            unrealized_pnl: snapshot.unrealized_pnl,
        }
    }

    pub fn is_open(&self) -> bool {
        self.direction != PositionDirection::None && !self.quantity.is_zero()
    }

    /// Side of the order that would reduce this position
    pub fn close_side(&self) -> Option<Side> {
        match self.direction {
            PositionDirection::Long => Some(Side::Sell),
            PositionDirection::Short => Some(Side::Buy),
            PositionDirection::None => None,
        }
    }

    /// Unrealized pnl if the position were valued at `price`
    pub fn pnl_at(&self, price: Price) -> Decimal {
        match self.direction {
            PositionDirection::Long => (price - self.entry_price) * self.quantity,
            PositionDirection::Short => (self.entry_price - price) * self.quantity,
            PositionDirection::None => Decimal::ZERO,
        }
    }

    /// Signed quantity, negative for short
    pub fn signed_quantity(&self) -> Quantity {
        match self.direction {
            PositionDirection::Long => self.quantity,
            PositionDirection::Short => -self.quantity,
            PositionDirection::None => Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(qty: Decimal) -> PositionSnapshot {
        PositionSnapshot {
            symbol: "BTCUSDT".into(),
            quantity: qty,
            entry_price: dec!(100),
            unrealized_pnl: dec!(0),
        }
    }

    #[test]
    fn test_short_snapshot_becomes_positive_quantity() {
        let view = PositionView::from_snapshot(&snapshot(dec!(-2)));
        assert_eq!(view.direction, PositionDirection::Short);
        assert_eq!(view.quantity, dec!(2));
        assert_eq!(view.signed_quantity(), dec!(-2));
        assert_eq!(view.close_side(), Some(Side::Buy));
    }

    #[test]
    fn test_zero_snapshot_is_flat() {
        let view = PositionView::from_snapshot(&snapshot(dec!(0)));
        assert!(!view.is_open());
        assert_eq!(view, PositionView::flat("BTCUSDT"));
        assert_eq!(view.close_side(), None);
    }

    #[test]
    fn test_pnl_at_price() {
        let long = PositionView::from_snapshot(&snapshot(dec!(1)));
        assert_eq!(long.pnl_at(dec!(94)), dec!(-6));

        let short = PositionView::from_snapshot(&snapshot(dec!(-1)));
        assert_eq!(short.pnl_at(dec!(94)), dec!(6));
    }
}
