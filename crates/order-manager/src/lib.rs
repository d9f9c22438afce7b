//! Argus Order Manager
//!
//! The coordination core between strategies and venues:
//! - **Lifecycle control**: at most one in-flight order per
//!   (exchange, symbol, category), bounded by a lock deadline
//! - **Deduplication**: redundant resting orders left by reconnects are canceled
//! - **Reconciliation**: local position belief healed against the exchange
//! - **Recovery**: flatten everything when a tick cannot finish safely
//! - **Journal**: order history, pnl and positions persisted for resume
//!
//! ## Architecture
//!
//! ```text
//!  Strategy tick
//!       │ submit / submit_group / cancel
//!  ┌────▼─────────────────────────┐       ┌──────────────┐
//!  │  OrderLifecycleController    │◄──────┤ DeadlineWheel│ reaper task
//!  │  slots: LockKey → Pending    │       └──────────────┘
//!  └────┬─────────────────────▲───┘
//!       │ create_order         │ on_status_push / on_open_orders
//!  ┌────▼─────┐          ┌─────┴──────────┐
//!  │ Exchange │─ push ──►│ EventDispatcher│──► MarketStateCache
//!  │ Client   │          └────────────────┘
//!  └────▲─────┘
//!       │ get_positions
//!  ┌────┴──────────────┐      ┌─────────────────┐
//!  │ PositionReconciler│◄─────┤ FailureRecovery │
//!  └───────────────────┘      └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use argus_order_manager::{ControllerConfig, OrderLifecycleController, VenueRegistry};
//!
//! let controller = Arc::new(OrderLifecycleController::new(venues, ControllerConfig::default()));
//! let _reaper = controller.spawn_reaper();
//!
//! match controller.submit(&exchange, OrderSpec::market("BTCUSDT", Side::Buy, dec!(0.01))).await {
//!     Ok(handle) => info!("placed {}", handle.order_id),
//!     Err(e) if e.is_benign() => {} // previous order still in flight
//!     Err(e) => return Err(e),
//! }
//! ```

pub mod controller;
pub mod deadline;
pub mod dispatch;
pub mod error;
pub mod journal;
pub mod reconciler;
pub mod recovery;
pub mod venues;

// Re-export commonly used types
pub use controller::{ControllerConfig, FillWait, LockKey, OrderLifecycleController, PendingOrder};
pub use deadline::DeadlineWheel;
pub use dispatch::EventDispatcher;
pub use error::{Error, Result};
pub use journal::{JournalSnapshot, OrderEvent, OrderRecord, StateJournal};
pub use reconciler::PositionReconciler;
pub use recovery::{FailureRecovery, RecoveryReport};
pub use venues::VenueRegistry;
