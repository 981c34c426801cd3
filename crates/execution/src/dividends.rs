//! Dividend processing: Announced -> Accrued (ex-date) -> Paid (pay-date).
//!
//! The processor takes each position's lock itself, so it serializes against
//! ticks and fills on the same position while running on its own schedule.

use crate::locks::PositionLocks;
use crate::outbox::flush_events;
use crate::retry::RetryPolicy;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info};
use volbal_core::{
    correlation_id, AccrualStatus, DividendAccrual, DividendAnnouncement, EngineError, EngineEvent,
    EventAction, EventLogger, EventType, Ledger, Position, PositionKey, Side,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccrualOutcome {
    Accrued(DividendAccrual),
    /// An accrual already existed; it is returned unchanged.
    AlreadyAccrued(DividendAccrual),
    /// The position held nothing at the ex-date; nothing was recorded.
    NoHolding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid {
        accrual: DividendAccrual,
        position: Position,
    },
    AlreadyPaid(DividendAccrual),
}

/// Counts from one [`DividendProcessor::process_due`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DividendRunSummary {
    pub accrued: usize,
    pub paid: usize,
    pub flagged: usize,
    pub failed: usize,
}

pub struct DividendProcessor {
    ledger: Arc<dyn Ledger>,
    events: Arc<dyn EventLogger>,
    locks: PositionLocks,
    retry: RetryPolicy,
}

impl DividendProcessor {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn Ledger>,
        events: Arc<dyn EventLogger>,
        locks: PositionLocks,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            events,
            locks,
            retry,
        }
    }

    /// Records an announcement. Re-announcing a known id returns the stored one.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a malformed announcement.
    pub async fn announce(&self, announcement: DividendAnnouncement) -> Result<DividendAnnouncement, EngineError> {
        announcement.validate()?;
        let stored = self.ledger.upsert_announcement(announcement).await?;
        info!(
            dividend = %stored.id,
            symbol = %stored.symbol,
            ex_date = %stored.ex_date,
            pay_date = %stored.pay_date,
            amount_per_share = %stored.amount_per_share,
            "dividend announced"
        );
        Ok(stored)
    }

    /// Fixes the entitlement of `key` from the quantity it held when the
    /// ex-date opened. Fills executed since then are backed out of the
    /// current quantity, so a pass that runs days late still pays the
    /// holders of record.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] for an unknown announcement or position
    /// - [`EngineError::Validation`] before the ex-date or for a position in another symbol
    /// - [`EngineError::DividendEntitlementMismatch`] when the trade history
    ///   cannot explain the current quantity; nothing is accrued
    pub async fn accrue(
        &self,
        announcement_id: &str,
        key: &PositionKey,
        at: DateTime<Utc>,
    ) -> Result<AccrualOutcome, EngineError> {
        let _guard = self.locks.acquire(key).await;
        self.retry
            .run("accrue_dividend", || self.try_accrue(announcement_id, key, at))
            .await
    }

    async fn try_accrue(
        &self,
        announcement_id: &str,
        key: &PositionKey,
        at: DateTime<Utc>,
    ) -> Result<AccrualOutcome, EngineError> {
        let announcement = self.load_announcement(announcement_id).await?;
        if let Some(existing) = self.ledger.get_accrual(key, announcement_id).await? {
            return Ok(AccrualOutcome::AlreadyAccrued(existing));
        }
        if at.date_naive() < announcement.ex_date {
            return Err(EngineError::Validation(format!(
                "dividend {announcement_id} cannot accrue before ex-date {}",
                announcement.ex_date
            )));
        }

        let mut position = self.load_position(key).await?;
        if position.symbol != announcement.symbol {
            return Err(EngineError::Validation(format!(
                "position {key} holds {} not {}",
                position.symbol, announcement.symbol
            )));
        }
        let (held, traded_since_ex) = self.holding_at_ex_date(&position, &announcement, at).await?;
        if held <= Decimal::ZERO {
            debug!(position = %key, dividend = %announcement_id, "no holding at ex-date");
            return Ok(AccrualOutcome::NoHolding);
        }
        if held != position.quantity {
            info!(
                position = %key,
                dividend = %announcement_id,
                held_at_ex_date = %held,
                held_now = %position.quantity,
                "accruing on the ex-date holding"
            );
        }

        let accrual = DividendAccrual::entitle(&announcement, key.clone(), held, at);

        // Ex-dividend the price drops by roughly the payout; move the anchor
        // with it. A fill since the ex-date already re-anchored at an
        // ex-dividend price.
        if let Some(anchor) = position.anchor_price.filter(|_| !traded_since_ex) {
            if anchor > announcement.amount_per_share {
                position.anchor_price = Some(anchor - announcement.amount_per_share);
            }
        }
        position.dividend_receivable += accrual.net;

        let event = dividend_event(key, &accrual.symbol, at, EventType::DividendAccrued, EventAction::AccrueDividend, "dividend_accrued");
        let (_, accrual) = self.ledger.commit_accrual(&position, accrual, event).await?;
        info!(
            position = %key,
            dividend = %announcement_id,
            qty_eligible = %accrual.qty_eligible,
            gross = %accrual.gross,
            net = %accrual.net,
            "dividend accrued"
        );
        flush_events(self.ledger.as_ref(), self.events.as_ref()).await;
        Ok(AccrualOutcome::Accrued(accrual))
    }

    /// Shares `position` held at the start of the ex-date: its quantity with
    /// every fill executed on or after the ex-date undone. The flag is set
    /// when there was any such fill.
    async fn holding_at_ex_date(
        &self,
        position: &Position,
        announcement: &DividendAnnouncement,
        at: DateTime<Utc>,
    ) -> Result<(Decimal, bool), EngineError> {
        let ex_open = Utc.from_utc_datetime(&announcement.ex_date.and_time(NaiveTime::MIN));
        let since: Vec<_> = self
            .ledger
            .trades(&position.key)
            .await?
            .into_iter()
            .filter(|t| t.executed_at >= ex_open)
            .collect();
        let held = since
            .iter()
            .fold(position.quantity, |qty, t| match t.side {
                Side::Buy => qty - t.qty,
                Side::Sell => qty + t.qty,
            });
        if held < Decimal::ZERO {
            let reason = format!(
                "trades since {} leave a negative ex-date holding of {held}",
                announcement.ex_date
            );
            error!(position = %position.key, dividend = %announcement.id, %reason, "dividend entitlement mismatch");
            self.ledger
                .enqueue(dividend_event(
                    &position.key,
                    &announcement.symbol,
                    at,
                    EventType::DividendMismatch,
                    EventAction::Review,
                    "dividend_mismatch",
                ))
                .await?;
            flush_events(self.ledger.as_ref(), self.events.as_ref()).await;
            return Err(mismatch(&position.key, &announcement.id, reason));
        }
        Ok((held, !since.is_empty()))
    }

    /// Settles an accrual: net moves into cash and the receivable clears.
    ///
    /// The amount paid is the one fixed at accrual, whatever the position
    /// holds today.
    ///
    /// # Errors
    ///
    /// - [`EngineError::DividendEntitlementMismatch`] when the accrual does not
    ///   reconcile; the accrual is flagged and no cash moves
    /// - [`EngineError::Validation`] before the pay date
    /// - [`EngineError::NotFound`] for an unknown accrual or position
    pub async fn pay(
        &self,
        key: &PositionKey,
        announcement_id: &str,
        at: DateTime<Utc>,
    ) -> Result<PaymentOutcome, EngineError> {
        let _guard = self.locks.acquire(key).await;
        self.retry
            .run("pay_dividend", || self.try_pay(key, announcement_id, at))
            .await
    }

    async fn try_pay(
        &self,
        key: &PositionKey,
        announcement_id: &str,
        at: DateTime<Utc>,
    ) -> Result<PaymentOutcome, EngineError> {
        let mut accrual = self
            .ledger
            .get_accrual(key, announcement_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("accrual {key}/{announcement_id}")))?;

        match accrual.status {
            AccrualStatus::Paid => return Ok(PaymentOutcome::AlreadyPaid(accrual)),
            AccrualStatus::Flagged => {
                return Err(mismatch(
                    key,
                    announcement_id,
                    accrual.flag_reason.unwrap_or_else(|| "flagged for review".to_string()),
                ))
            }
            AccrualStatus::Accrued => {}
        }
        if at.date_naive() < accrual.pay_date {
            return Err(EngineError::Validation(format!(
                "dividend {announcement_id} is not payable before {}",
                accrual.pay_date
            )));
        }

        let mut position = self.load_position(key).await?;
        let verified = match self.ledger.get_announcement(announcement_id).await? {
            Some(announcement) => accrual.verify_payable(&announcement, position.dividend_receivable),
            None => Err("announcement no longer exists".to_string()),
        };
        if let Err(reason) = verified {
            return Err(self.flag(key, &accrual.symbol, announcement_id, reason, at).await);
        }

        position.cash += accrual.net;
        position.total_dividends_received += accrual.net;
        position.dividend_receivable -= accrual.net;
        accrual.status = AccrualStatus::Paid;
        accrual.paid_at = Some(at);

        let event = dividend_event(key, &accrual.symbol, at, EventType::DividendPaid, EventAction::PayDividend, "dividend_paid");
        let (position, accrual) = self.ledger.commit_payment(&position, accrual, event).await?;
        info!(
            position = %key,
            dividend = %announcement_id,
            net = %accrual.net,
            qty_eligible = %accrual.qty_eligible,
            "dividend paid"
        );
        flush_events(self.ledger.as_ref(), self.events.as_ref()).await;
        Ok(PaymentOutcome::Paid { accrual, position })
    }

    /// Accrues every announcement whose ex-date has arrived (and whose pay
    /// date has not passed) for every position in its symbol, then pays every
    /// accrual whose pay date has arrived. Failures are logged and counted;
    /// one position never stops the rest.
    ///
    /// # Errors
    ///
    /// Returns an error only if the ledger cannot be listed.
    pub async fn process_due(&self, now: DateTime<Utc>) -> Result<DividendRunSummary, EngineError> {
        let today = now.date_naive();
        let mut summary = DividendRunSummary::default();

        let due: Vec<DividendAnnouncement> = self
            .ledger
            .announcements()
            .await?
            .into_iter()
            .filter(|a| a.ex_date <= today && today <= a.pay_date)
            .collect();
        if !due.is_empty() {
            let positions = self.ledger.list().await?;
            for announcement in &due {
                for position in positions.iter().filter(|p| p.symbol == announcement.symbol) {
                    match self.accrue(&announcement.id, &position.key, now).await {
                        Ok(AccrualOutcome::Accrued(_)) => summary.accrued += 1,
                        Ok(_) => {}
                        Err(EngineError::DividendEntitlementMismatch { .. }) => summary.flagged += 1,
                        Err(e) => {
                            error!(position = %position.key, dividend = %announcement.id, error = %e, "dividend accrual failed");
                            summary.failed += 1;
                        }
                    }
                }
            }
        }

        let payable: Vec<DividendAccrual> = self
            .ledger
            .accruals()
            .await?
            .into_iter()
            .filter(|a| a.status == AccrualStatus::Accrued && a.pay_date <= today)
            .collect();
        for accrual in payable {
            match self.pay(&accrual.key, &accrual.announcement_id, now).await {
                Ok(PaymentOutcome::Paid { .. }) => summary.paid += 1,
                Ok(PaymentOutcome::AlreadyPaid(_)) => {}
                Err(EngineError::DividendEntitlementMismatch { .. }) => summary.flagged += 1,
                Err(e) => {
                    error!(position = %accrual.key, dividend = %accrual.announcement_id, error = %e, "dividend payment failed");
                    summary.failed += 1;
                }
            }
        }

        if summary != DividendRunSummary::default() {
            info!(
                accrued = summary.accrued,
                paid = summary.paid,
                flagged = summary.flagged,
                failed = summary.failed,
                "dividend pass complete"
            );
        }
        Ok(summary)
    }

    async fn flag(
        &self,
        key: &PositionKey,
        symbol: &str,
        announcement_id: &str,
        reason: String,
        at: DateTime<Utc>,
    ) -> EngineError {
        error!(position = %key, dividend = %announcement_id, %reason, "dividend entitlement mismatch, flagged for review");
        let event = dividend_event(key, symbol, at, EventType::DividendMismatch, EventAction::Review, "dividend_mismatch");
        if let Err(e) = self.ledger.flag_accrual(key, announcement_id, reason.clone(), event).await {
            return e;
        }
        flush_events(self.ledger.as_ref(), self.events.as_ref()).await;
        mismatch(key, announcement_id, reason)
    }

    async fn load_announcement(&self, id: &str) -> Result<DividendAnnouncement, EngineError> {
        self.ledger
            .get_announcement(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("dividend announcement {id}")))
    }

    async fn load_position(&self, key: &PositionKey) -> Result<Position, EngineError> {
        self.ledger
            .get(key)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("position {key}")))
    }
}

fn dividend_event(
    key: &PositionKey,
    symbol: &str,
    at: DateTime<Utc>,
    event_type: EventType,
    action: EventAction,
    reason: &str,
) -> EngineEvent {
    EngineEvent::new(key, symbol, at, correlation_id(key, at), event_type, action, reason)
}

fn mismatch(key: &PositionKey, announcement_id: &str, reason: String) -> EngineError {
    EngineError::DividendEntitlementMismatch {
        key: key.to_string(),
        announcement_id: announcement_id.to_string(),
        reason,
    }
}
