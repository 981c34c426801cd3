//! Dividend announcements and entitlements.
//!
//! An accrual freezes the holding at the ex-date. Nothing that happens to
//! the position afterwards changes `qty_eligible` or the amounts derived from it.

use crate::error::EngineError;
use crate::position::PositionKey;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividendAnnouncement {
    pub id: String,
    pub symbol: String,
    pub ex_date: NaiveDate,
    pub pay_date: NaiveDate,
    pub amount_per_share: Decimal,
    /// Fraction of gross withheld at source.
    #[serde(default)]
    pub withholding_rate: Decimal,
}

impl DividendAnnouncement {
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a blank id, non-positive
    /// amount, pay date before ex date or withholding outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::Validation("dividend id must not be blank".to_string()));
        }
        if self.amount_per_share <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "dividend {} amount per share must be positive",
                self.id
            )));
        }
        if self.pay_date < self.ex_date {
            return Err(EngineError::Validation(format!(
                "dividend {} pays on {} before its ex-date {}",
                self.id, self.pay_date, self.ex_date
            )));
        }
        if self.withholding_rate < Decimal::ZERO || self.withholding_rate > Decimal::ONE {
            return Err(EngineError::Validation(format!(
                "dividend {} withholding rate must lie within [0, 1]",
                self.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccrualStatus {
    Accrued,
    Paid,
    /// Held for manual review; never paid automatically.
    Flagged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividendAccrual {
    pub announcement_id: String,
    #[serde(flatten)]
    pub key: PositionKey,
    pub symbol: String,
    pub ex_date: NaiveDate,
    pub pay_date: NaiveDate,
    pub amount_per_share: Decimal,
    pub qty_eligible: Decimal,
    pub gross: Decimal,
    pub withholding: Decimal,
    pub net: Decimal,
    pub status: AccrualStatus,
    pub accrued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_reason: Option<String>,
}

impl DividendAccrual {
    /// Entitlement for `qty_eligible` shares held at the ex-date.
    #[must_use]
    pub fn entitle(
        announcement: &DividendAnnouncement,
        key: PositionKey,
        qty_eligible: Decimal,
        accrued_at: DateTime<Utc>,
    ) -> Self {
        let gross = qty_eligible * announcement.amount_per_share;
        let withholding = gross * announcement.withholding_rate;
        Self {
            announcement_id: announcement.id.clone(),
            key,
            symbol: announcement.symbol.clone(),
            ex_date: announcement.ex_date,
            pay_date: announcement.pay_date,
            amount_per_share: announcement.amount_per_share,
            qty_eligible,
            gross,
            withholding,
            net: gross - withholding,
            status: AccrualStatus::Accrued,
            accrued_at,
            paid_at: None,
            flag_reason: None,
        }
    }

    /// Cross-checks the stored amounts against the announcement and the
    /// position's receivable before any cash moves.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason for the first inconsistency.
    pub fn verify_payable(
        &self,
        announcement: &DividendAnnouncement,
        receivable: Decimal,
    ) -> Result<(), String> {
        if self.status != AccrualStatus::Accrued {
            return Err(format!("accrual is {:?}, expected accrued", self.status));
        }
        if self.announcement_id != announcement.id || self.symbol != announcement.symbol {
            return Err("accrual does not belong to this announcement".to_string());
        }
        if self.amount_per_share != announcement.amount_per_share {
            return Err(format!(
                "amount per share changed from {} to {}",
                self.amount_per_share, announcement.amount_per_share
            ));
        }
        if self.gross != self.qty_eligible * self.amount_per_share {
            return Err(format!(
                "gross {} != {} x {}",
                self.gross, self.qty_eligible, self.amount_per_share
            ));
        }
        if self.withholding < Decimal::ZERO || self.net != self.gross - self.withholding {
            return Err(format!(
                "net {} != gross {} - withholding {}",
                self.net, self.gross, self.withholding
            ));
        }
        if receivable < self.net {
            return Err(format!("receivable {receivable} does not cover net {}", self.net));
        }
        Ok(())
    }
}
