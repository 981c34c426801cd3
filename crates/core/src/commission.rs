//! Commission rate lookup.
//!
//! Rates resolve through an explicit fallback chain, most specific first:
//! TENANT+ASSET, then TENANT, then GLOBAL.

use crate::error::EngineError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionScope {
    TenantAsset,
    Tenant,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionSchedule {
    /// Fraction of notional, e.g. `0.0001` = 1 bp.
    pub global_rate: Decimal,
    #[serde(default)]
    pub tenants: BTreeMap<String, Decimal>,
    /// tenant -> asset -> rate
    #[serde(default)]
    pub tenant_assets: BTreeMap<String, BTreeMap<String, Decimal>>,
}

impl Default for CommissionSchedule {
    fn default() -> Self {
        Self {
            global_rate: Decimal::new(1, 4),
            tenants: BTreeMap::new(),
            tenant_assets: BTreeMap::new(),
        }
    }
}

impl CommissionSchedule {
    #[must_use]
    pub fn flat(rate: Decimal) -> Self {
        Self {
            global_rate: rate,
            ..Self::default()
        }
    }

    /// Resolves the rate for `tenant_id` trading `asset` and reports which
    /// scope supplied it.
    #[must_use]
    pub fn resolve(&self, tenant_id: &str, asset: &str) -> (Decimal, CommissionScope) {
        let chain: [(CommissionScope, Option<Decimal>); 3] = [
            (
                CommissionScope::TenantAsset,
                self.tenant_assets
                    .get(tenant_id)
                    .and_then(|assets| assets.get(asset))
                    .copied(),
            ),
            (CommissionScope::Tenant, self.tenants.get(tenant_id).copied()),
            (CommissionScope::Global, Some(self.global_rate)),
        ];

        chain
            .into_iter()
            .find_map(|(scope, rate)| rate.map(|r| (r, scope)))
            .unwrap_or((self.global_rate, CommissionScope::Global))
    }

    /// Rejects negative rates anywhere in the schedule.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] naming the first negative entry.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.global_rate < Decimal::ZERO {
            return Err(EngineError::Config("global commission rate is negative".to_string()));
        }
        for (tenant, rate) in &self.tenants {
            if *rate < Decimal::ZERO {
                return Err(EngineError::Config(format!(
                    "commission rate for tenant {tenant} is negative"
                )));
            }
        }
        for (tenant, assets) in &self.tenant_assets {
            for (asset, rate) in assets {
                if *rate < Decimal::ZERO {
                    return Err(EngineError::Config(format!(
                        "commission rate for {tenant}/{asset} is negative"
                    )));
                }
            }
        }
        Ok(())
    }
}
