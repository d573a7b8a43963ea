//! Periodic repair of payments that the webhook path never confirmed.
//!
//! A sweep loads a bounded batch of pending payments, asks the processor what really happened to each intent and
//! converges the local record. Intents that are still in flight after the expiry window are canceled at the processor
//! first and only then locally, so a payment that succeeds at the last moment is never overwritten.
//!
//! Each sweep also re-sends partner notifications for payments that were settled but never handed to the dispatcher,
//! which happens when a process dies between the two steps.
//!
//! Only one sweep runs across the whole deployment at a time. Instances that fail to take the lock skip the interval.
use std::{fmt::Debug, panic::AssertUnwindSafe, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use futures_util::FutureExt;
use log::*;

use crate::{
    api::{
        exchange_rate_api::RateResolver,
        notifications::{notify_partner, resolve_payment_type},
    },
    callbacks::{CallbackDispatch, CallbackMethod},
    db_types::{Payment, PaymentStatus},
    processor::{Intent, IntentStatus, PaymentProcessor},
    traits::{DistributedLock, IntentSettlement, PaymentGatewayDatabase, PaymentGatewayError, SettlementOutcome},
};

pub const SWEEP_LOCK_KEY: &str = "reconciliation-sweep";
pub const DEFAULT_SWEEP_BATCH_SIZE: u32 = 100;
pub const DEFAULT_EXPIRY_MINUTES: i64 = 30;
pub const DEFAULT_LOCK_LEASE: StdDuration = StdDuration::from_secs(900);
pub const DEFAULT_RENOTIFY_AFTER_MINUTES: i64 = 5;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub batch_size: u32,
    /// Pending payments older than this are canceled if their intent is still in flight.
    pub expiry: Duration,
    /// Should comfortably exceed the time a full batch takes, otherwise a second sweep may start before the first ends.
    pub lock_lease: StdDuration,
    /// Settled payments still flagged as unreported after this long are notified again.
    pub renotify_after: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            expiry: Duration::minutes(DEFAULT_EXPIRY_MINUTES),
            lock_lease: DEFAULT_LOCK_LEASE,
            renotify_after: Duration::minutes(DEFAULT_RENOTIFY_AFTER_MINUTES),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub completed: usize,
    pub canceled: usize,
    pub expired: usize,
    /// Records left for a later sweep because of a processor error or an intent in an unexpected state.
    pub skipped: usize,
    /// Young records whose intent is still in flight.
    pub untouched: usize,
    /// Settled payments whose partner notification had been lost and was sent again.
    pub renotified: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    LockNotAcquired,
    Completed(SweepReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemResult {
    Completed,
    Canceled,
    Expired,
    Skipped,
    Untouched,
}

pub struct ReconciliationSweep<B, P, L, D> {
    db: B,
    processor: P,
    lock: L,
    dispatcher: D,
    rates: RateResolver,
    config: SweepConfig,
    holder: String,
}

impl<B, P, L, D> Debug for ReconciliationSweep<B, P, L, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationSweep({}, {:?})", self.holder, self.config)
    }
}

impl<B, P, L, D> ReconciliationSweep<B, P, L, D>
where
    B: PaymentGatewayDatabase,
    P: PaymentProcessor,
    L: DistributedLock,
    D: CallbackDispatch,
{
    pub fn new(db: B, processor: P, lock: L, dispatcher: D, rates: RateResolver, config: SweepConfig) -> Self {
        let holder = format!("sweep-{:016x}", rand::random::<u64>());
        Self { db, processor, lock, dispatcher, rates, config, holder }
    }

    /// The identity this instance uses when it takes the sweep lock.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub async fn run(&self) -> Result<SweepOutcome, PaymentGatewayError> {
        self.run_at(Utc::now()).await
    }

    /// Runs one sweep, measuring payment ages against `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<SweepOutcome, PaymentGatewayError> {
        if !self.lock.try_acquire(SWEEP_LOCK_KEY, &self.holder, self.config.lock_lease).await? {
            debug!("🧹️ Another instance holds the sweep lock. Skipping this run.");
            return Ok(SweepOutcome::LockNotAcquired);
        }
        let result = AssertUnwindSafe(self.sweep_batch(now)).catch_unwind().await;
        if let Err(e) = self.lock.release(SWEEP_LOCK_KEY, &self.holder).await {
            error!("🧹️ Could not release the sweep lock: {e}. It will expire in {:?}", self.config.lock_lease);
        }
        match result {
            Ok(Ok(report)) => {
                info!("🧹️ Sweep complete: {report:?}");
                Ok(SweepOutcome::Completed(report))
            },
            Ok(Err(e)) => {
                error!("🧹️ Sweep aborted: {e}");
                Err(e)
            },
            Err(_) => {
                error!("🧹️ Sweep panicked. The lock has been released.");
                Err(PaymentGatewayError::DatabaseError("The reconciliation sweep panicked".into()))
            },
        }
    }

    async fn sweep_batch(&self, now: DateTime<Utc>) -> Result<SweepReport, PaymentGatewayError> {
        let pending = self.db.fetch_pending_payments(self.config.batch_size).await?;
        let mut report = SweepReport { examined: pending.len(), ..Default::default() };
        for payment in &pending {
            match self.reconcile(payment, now).await {
                ItemResult::Completed => report.completed += 1,
                ItemResult::Canceled => report.canceled += 1,
                ItemResult::Expired => report.expired += 1,
                ItemResult::Skipped => report.skipped += 1,
                ItemResult::Untouched => report.untouched += 1,
            }
        }
        report.renotified = self.renotify_unreported(now).await.unwrap_or_else(|e| {
            error!("🧹️ Could not re-send lost partner notifications: {e}");
            0
        });
        Ok(report)
    }

    async fn renotify_unreported(&self, now: DateTime<Utc>) -> Result<usize, PaymentGatewayError> {
        let settled_before = now - self.config.renotify_after;
        let unreported = self.db.fetch_unreported_payments(settled_before, self.config.batch_size).await?;
        let mut count = 0;
        for payment in &unreported {
            let method = match payment.status {
                PaymentStatus::Completed => CallbackMethod::Pay,
                PaymentStatus::Failed => CallbackMethod::Error,
                _ => {
                    self.db.mark_reported(payment.id).await?;
                    continue;
                },
            };
            warn!("🧹️ Payment #{} was settled as {} but the partner was never notified. Notifying now.", payment.id, payment.status);
            notify_partner(&self.db, &self.dispatcher, &self.rates, payment, method).await;
            count += 1;
        }
        Ok(count)
    }

    async fn reconcile(&self, payment: &Payment, now: DateTime<Utc>) -> ItemResult {
        let Some(intent_id) = payment.intent_id.as_ref() else {
            return ItemResult::Skipped;
        };
        let intent = match self.processor.get_intent(intent_id).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!("🧹️ Could not query intent {intent_id} for payment #{}: {e}. Will try again later.", payment.id);
                return ItemResult::Skipped;
            },
        };
        match intent.status {
            IntentStatus::Succeeded => self.complete(payment, &intent).await,
            IntentStatus::Canceled => self.cancel_locally(payment, ItemResult::Canceled).await,
            _ if now - payment.created_at < self.config.expiry => ItemResult::Untouched,
            _ => self.expire(payment, &intent).await,
        }
    }

    async fn complete(&self, payment: &Payment, intent: &Intent) -> ItemResult {
        let metadata = intent.payment_metadata();
        let declared = metadata.payment_type.as_deref().or(payment.payment_type.as_deref());
        let payment_type = resolve_payment_type(&self.processor, &intent.id, declared).await;
        let settlement = IntentSettlement {
            intent_id: intent.id.clone(),
            outcome: SettlementOutcome::Completed,
            amount: intent.amount,
            currency: intent.currency_code(),
            metadata,
            payment_type,
        };
        match self.db.settle_intent(None, settlement).await {
            Ok(result) => match result.applied() {
                Some(updated) => {
                    info!("🧹️ Payment #{} for intent {} succeeded without a webhook. Marked completed.", updated.id, intent.id);
                    notify_partner(&self.db, &self.dispatcher, &self.rates, updated, CallbackMethod::Pay).await;
                    ItemResult::Completed
                },
                None => ItemResult::Untouched,
            },
            Err(e) => {
                error!("🧹️ Could not complete payment #{}: {e}", payment.id);
                ItemResult::Skipped
            },
        }
    }

    async fn expire(&self, payment: &Payment, intent: &Intent) -> ItemResult {
        match self.processor.cancel_intent(&intent.id).await {
            Ok(_) => {
                info!("🧹️ Payment #{} expired. Intent {} canceled.", payment.id, intent.id);
                self.cancel_locally(payment, ItemResult::Expired).await
            },
            Err(e) if e.is_unexpected_state() => {
                info!("🧹️ Intent {} could not be canceled ({e}). Leaving payment #{} for now.", intent.id, payment.id);
                ItemResult::Skipped
            },
            Err(e) => {
                warn!("🧹️ Could not cancel intent {} for payment #{}: {e}", intent.id, payment.id);
                ItemResult::Skipped
            },
        }
    }

    async fn cancel_locally(&self, payment: &Payment, on_success: ItemResult) -> ItemResult {
        let Some(intent_id) = payment.intent_id.as_ref() else {
            return ItemResult::Skipped;
        };
        match self.db.cancel_pending_intent(None, intent_id).await {
            Ok(result) if result.is_applied() => on_success,
            Ok(_) => ItemResult::Untouched,
            Err(e) => {
                error!("🧹️ Could not cancel payment #{}: {e}", payment.id);
                ItemResult::Skipped
            },
        }
    }
}
