//! Domain core for volatility balancing: position and order types, the pure
//! trigger / guardrail / sizing evaluators, configuration and the ports the
//! services are built against.

pub mod commission;
pub mod config;
pub mod config_loader;
pub mod dividend;
pub mod error;
pub mod events;
pub mod guardrail;
pub mod order;
pub mod order_policy;
pub mod position;
pub mod position_sizing;
pub mod traits;
pub mod trigger;

pub use commission::{CommissionSchedule, CommissionScope};
pub use config::{AppConfig, EngineConfig, PositionSettings, SchedulerConfig, SettingsOverride, SettingsScope};
pub use config_loader::ConfigLoader;
pub use dividend::{AccrualStatus, DividendAccrual, DividendAnnouncement};
pub use error::EngineError;
pub use events::{
    correlation_id, Bar, BarInterval, EngineEvent, EventAction, EventType, MarketSession, Quote,
};
pub use guardrail::{evaluate_guardrail, recheck_fill, GuardrailConfig, GuardrailDecision, GuardrailInput, GuardrailReason};
pub use order::{Order, OrderId, OrderStatus, PricePolicy, Side, Trade, TradeId, TradeStatus};
pub use order_policy::{BelowMinAction, OrderPolicy, PolicyCheck};
pub use position::{Position, PositionKey};
pub use position_sizing::{SizingContext, SizingStrategy};
pub use traits::{
    Clock, ConfigStore, DividendRepository, EventLogger, EventOutbox, HistoricalDataProvider, Ledger,
    MarketDataProvider, OrderRepository, PositionRepository, SystemClock,
};
pub use trigger::{evaluate_trigger, TriggerConfig, TriggerDecision, TriggerDirection};
