//! Argus Strategy Engines
//!
//! Decision functions driven by the runner's fixed tick:
//! - [`TrendEngine`]: moving-average cross entries, two-tier stop, trailing stop
//! - [`MakerEngine`]: two-sided post-only quoting, single close order when positioned
//! - [`ArbitrageEngine`]: two-venue spread capture with leg-by-leg fill confirmation
//!
//! ## Architecture
//!
//! ```text
//!  MarketStateCache ──┐
//!  PositionReconciler ├──► StrategyEngine::tick ──► Action
//!  Signal ────────────┘            │
//!                                  │ submit / submit_group / cancel
//!                                  ▼
//!                      OrderLifecycleController
//!                                  │ on leg failure
//!                                  ▼
//!                           FailureRecovery
//! ```
//!
//! Engines read state and issue commands; they never write the cache or the
//! position view.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use argus_strategy::{MakerConfig, MakerEngine, StrategyEngine};
//!
//! let mut engine = MakerEngine::new(ctx, ExchangeId::new("aster"), "BTCUSDT", dec!(0.001), MakerConfig::default());
//! let action = engine.tick().await?;
//! ```

pub mod arbitrage;
pub mod engine;
pub mod error;
pub mod maker;
pub mod signal;
pub mod trend;

// Re-export main types
pub use arbitrage::{ArbitrageConfig, ArbitrageEngine};
pub use engine::{Action, EngineContext, StrategyEngine};
pub use error::{Result, StrategyError};
pub use maker::{MakerConfig, MakerEngine};
pub use signal::{DEFAULT_SMA_PERIOD, SmaCrossSignal};
pub use trend::{TrendConfig, TrendEngine};
