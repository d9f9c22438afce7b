//! Argus Runner - process wiring and the decision loop
//!
//! - **Config**: JSON startup configuration, credentials from the environment
//! - **Bootstrap**: venues, controller, reconciler, recovery, cache, feeds, engine
//! - **Decision loop**: fixed-interval ticks with a fault boundary
//!
//! ## Architecture
//!
//! ```text
//!   Venue A ─┐                         ┌──────────────────────────┐
//!   Venue B ─┼─► feed listeners ──────►│ dispatcher               │
//!            │   (reconnect, capped)   │  ├─► MarketStateCache    │
//!            │                         │  └─► lifecycle controller│
//!            │                         └──────────────────────────┘
//!            │
//!            │   ┌───────────────────────────────────────────────┐
//!            └──►│ decision loop                                 │
//!                │   reconcile ─► engine.tick ─► controller      │
//!                │        fatal ─► FailureRecovery               │
//!                └───────────────────────────────────────────────┘
//! ```
//!
//! Only reconnect exhaustion ends the process; every tick error is handled
//! inside the loop.

pub mod bootstrap;
pub mod config;
pub mod decision_loop;
pub mod error;

pub use bootstrap::{Runtime, build_engine, build_venues};
pub use config::{
    ConfigError, ExchangeConfig, RunnerConfig, SeedBook, StrategyKind, StrategySection, VenueKind, load_config,
    load_config_from_str,
};
pub use decision_loop::{DecisionLoop, LoopStats, TickOutcome};
pub use error::{Result, RunnerError};
