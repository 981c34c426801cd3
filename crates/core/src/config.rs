use crate::commission::CommissionSchedule;
use crate::error::EngineError;
use crate::guardrail::GuardrailConfig;
use crate::order_policy::OrderPolicy;
use crate::position::PositionKey;
use crate::position_sizing::SizingStrategy;
use crate::trigger::TriggerConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub commission: CommissionSchedule,
    #[serde(default)]
    pub defaults: PositionSettings,
    #[serde(default)]
    pub overrides: Vec<SettingsOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deviation from anchor (fraction) above which the anchor is treated as stale.
    pub anchor_reset_threshold: Decimal,
    /// Seed a missing anchor from the first quote seen.
    pub initialize_missing_anchor: bool,
    pub max_persistence_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            anchor_reset_threshold: Decimal::new(50, 2),
            initialize_missing_anchor: true,
            max_persistence_retries: 3,
            retry_base_delay_ms: 50,
            retry_max_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Six-field cron expression (with seconds) for evaluation ticks.
    pub tick_cron: String,
    pub dividend_cron: String,
    pub quote_timeout_ms: u64,
    /// Upper bound on positions evaluated at once within a cycle.
    pub max_concurrent_ticks: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_cron: "0 * * * * *".to_string(),
            dividend_cron: "0 0 * * * *".to_string(),
            quote_timeout_ms: 5_000,
            max_concurrent_ticks: 16,
        }
    }
}

/// Everything the engine needs to evaluate one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionSettings {
    pub trigger: TriggerConfig,
    pub guardrail: GuardrailConfig,
    pub order_policy: OrderPolicy,
    pub sizing: SizingStrategy,
    pub rebalance_ratio: Decimal,
    pub max_orders_per_day: u32,
}

impl Default for PositionSettings {
    fn default() -> Self {
        Self {
            trigger: TriggerConfig::default(),
            guardrail: GuardrailConfig::default(),
            order_policy: OrderPolicy::default(),
            sizing: SizingStrategy::default(),
            rebalance_ratio: Decimal::new(5, 1),
            max_orders_per_day: 10,
        }
    }
}

impl PositionSettings {
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |msg: &str| Err(EngineError::Config(msg.to_string()));

        if self.trigger.up_threshold < Decimal::ZERO || self.trigger.down_threshold < Decimal::ZERO {
            return fail("trigger thresholds must not be negative");
        }
        let g = &self.guardrail;
        if g.min_stock_allocation < Decimal::ZERO || g.max_stock_allocation > Decimal::ONE {
            return fail("stock allocation bounds must lie within [0, 1]");
        }
        if g.min_stock_allocation > g.max_stock_allocation {
            return fail("min stock allocation exceeds max stock allocation");
        }
        if g.max_trade_pct < Decimal::ZERO {
            return fail("max trade size must not be negative");
        }
        let p = &self.order_policy;
        if p.min_qty < Decimal::ZERO
            || p.min_notional < Decimal::ZERO
            || p.lot_size < Decimal::ZERO
            || p.qty_step < Decimal::ZERO
        {
            return fail("order policy values must not be negative");
        }
        if self.rebalance_ratio <= Decimal::ZERO || self.rebalance_ratio > Decimal::ONE {
            return fail("rebalance ratio must lie within (0, 1]");
        }
        Ok(())
    }
}

/// Settings that replace the defaults for a tenant, portfolio or position.
/// Omitted `portfolio_id` / `position_id` widen the scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsOverride {
    pub tenant_id: String,
    #[serde(default)]
    pub portfolio_id: Option<String>,
    #[serde(default)]
    pub position_id: Option<String>,
    pub settings: PositionSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettingsScope {
    Position,
    Portfolio,
    Tenant,
    Global,
}

impl SettingsOverride {
    fn scope(&self) -> SettingsScope {
        match (&self.portfolio_id, &self.position_id) {
            (Some(_), Some(_)) => SettingsScope::Position,
            (Some(_), None) => SettingsScope::Portfolio,
            (None, _) => SettingsScope::Tenant,
        }
    }

    fn matches(&self, key: &PositionKey, scope: SettingsScope) -> bool {
        if self.scope() != scope || self.tenant_id != key.tenant_id {
            return false;
        }
        let portfolio_ok = self
            .portfolio_id
            .as_ref()
            .map_or(true, |p| *p == key.portfolio_id);
        let position_ok = self
            .position_id
            .as_ref()
            .map_or(true, |p| *p == key.position_id);
        portfolio_ok && position_ok
    }
}

impl AppConfig {
    /// Resolves per-position settings: POSITION, then PORTFOLIO, then TENANT,
    /// then the global defaults. The first match supplies the whole block.
    #[must_use]
    pub fn settings_for(&self, key: &PositionKey) -> (&PositionSettings, SettingsScope) {
        [
            SettingsScope::Position,
            SettingsScope::Portfolio,
            SettingsScope::Tenant,
        ]
        .into_iter()
        .find_map(|scope| {
            self.overrides
                .iter()
                .find(|o| o.matches(key, scope))
                .map(|o| (&o.settings, scope))
        })
        .unwrap_or((&self.defaults, SettingsScope::Global))
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for the first invalid section.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.commission.validate()?;
        self.defaults.validate()?;
        for o in &self.overrides {
            o.settings.validate().map_err(|e| {
                EngineError::Config(format!("override for tenant {}: {e}", o.tenant_id))
            })?;
        }
        if self.engine.anchor_reset_threshold <= Decimal::ZERO {
            return Err(EngineError::Config(
                "anchor reset threshold must be positive".to_string(),
            ));
        }
        if self.scheduler.max_concurrent_ticks == 0 {
            return Err(EngineError::Config(
                "max_concurrent_ticks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
