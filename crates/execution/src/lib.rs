//! Stateful services over the core ports: the order lifecycle, dividend
//! processing, per-position locking, event delivery, and the in-memory and
//! file adapters.

pub mod dividends;
pub mod journal;
pub mod locks;
pub mod memory;
pub mod orders;
pub mod outbox;
pub mod retry;

pub use dividends::{AccrualOutcome, DividendProcessor, DividendRunSummary, PaymentOutcome};
pub use journal::JsonLinesEventLog;
pub use locks::{PositionGuard, PositionLocks};
pub use memory::{InMemoryEventLog, InMemoryLedger, StaticConfigStore};
pub use orders::{ExecuteRequest, FillOutcome, OrderService, SubmitOutcome, SubmitRequest};
pub use outbox::flush_events;
pub use retry::RetryPolicy;
