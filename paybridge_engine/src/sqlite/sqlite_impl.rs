//! `SqliteDatabase` is a concrete implementation of a payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module: payments and the event ledgers, owners, the callback queue and the sweep lock all live in the same
//! database. The queue can be pointed at a separate database by creating a second `SqliteDatabase`.
use std::{fmt::Debug, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate, SqlitePool};

use super::db::{callback_jobs, db_url, events, locks, new_pool, notifications, now_millis, owners, payments};
use crate::{
    callbacks::{CallbackJob, RetentionPolicy, RetryPolicy},
    db_types::{DeadLetterEvent, IntentId, NewOwner, NewPayment, Owner, Payment, PaymentStatus},
    traits::{
        CallbackQueue,
        DistributedLock,
        FailureOutcome,
        IntentSettlement,
        JobState,
        NewDeadLetter,
        OwnerManagement,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        QueueError,
        QueuedJob,
        TransitionResult,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::insert_payment(payment, &mut conn).await
    }

    async fn fetch_payment(&self, id: i64) -> Result<Option<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment(id, &mut conn).await?)
    }

    async fn fetch_payment_by_intent(&self, intent_id: &IntentId) -> Result<Option<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment_by_intent(intent_id, &mut conn).await?)
    }

    async fn fetch_pending_payments(&self, limit: u32) -> Result<Vec<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_pending_payments(limit, &mut conn).await?)
    }

    async fn fetch_completed_payments_for_owner(&self, owner_id: i64) -> Result<Vec<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payments_for_owner(owner_id, PaymentStatus::Completed, &mut conn).await?)
    }

    async fn update_payment_type(
        &self,
        intent_id: &IntentId,
        payment_type: &str,
    ) -> Result<Option<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::update_payment_type(intent_id, payment_type, &mut conn).await?)
    }

    async fn settle_intent(
        &self,
        event_id: Option<&str>,
        settlement: IntentSettlement,
    ) -> Result<TransitionResult, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        if let Some(event_id) = event_id {
            if !events::insert_processed_event(event_id, &mut tx).await? {
                return Ok(TransitionResult::DuplicateEvent);
            }
        }
        let status = settlement.outcome.status();
        let intent_id = settlement.intent_id.clone();
        let updated = payments::update_status_if_pending(
            &intent_id,
            status,
            settlement.metadata.description.as_deref(),
            settlement.payment_type.as_deref(),
            &mut tx,
        )
        .await?;
        let result = match updated {
            Some(payment) => {
                debug!("🗃️ Payment #{} for intent {intent_id} is now {status}", payment.id);
                notifications::insert_unreported(payment.id, now_millis(), &mut tx).await?;
                TransitionResult::Applied(payment)
            },
            None => match payments::fetch_payment_by_intent(&intent_id, &mut tx).await? {
                Some(existing) => {
                    debug!(
                        "🗃️ Payment #{} for intent {intent_id} is already {}. Not moving it to {status}",
                        existing.id, existing.status
                    );
                    TransitionResult::Unchanged(Some(existing))
                },
                None => {
                    let public_key = settlement
                        .metadata
                        .public_key
                        .clone()
                        .ok_or_else(|| PaymentGatewayError::MissingOwnerReference(intent_id.clone()))?;
                    let owner = owners::fetch_owner_by_public_key(&public_key, &mut tx)
                        .await?
                        .ok_or_else(|| PaymentGatewayError::UnknownOwner(public_key.clone()))?;
                    let mut metadata = settlement.metadata;
                    if settlement.payment_type.is_some() {
                        metadata.payment_type = settlement.payment_type;
                    }
                    let new_payment = NewPayment::new(intent_id.clone(), owner.id, settlement.amount, &settlement.currency)
                        .with_status(status)
                        .with_metadata(metadata);
                    let payment = payments::insert_payment(new_payment, &mut tx).await?;
                    info!("🗃️ Payment #{} for intent {intent_id} created from processor event as {status}", payment.id);
                    notifications::insert_unreported(payment.id, now_millis(), &mut tx).await?;
                    TransitionResult::Applied(payment)
                },
            },
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn cancel_pending_intent(
        &self,
        event_id: Option<&str>,
        intent_id: &IntentId,
    ) -> Result<TransitionResult, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        if let Some(event_id) = event_id {
            if !events::insert_processed_event(event_id, &mut tx).await? {
                return Ok(TransitionResult::DuplicateEvent);
            }
        }
        let updated =
            payments::update_status_if_pending(intent_id, PaymentStatus::Canceled, None, None, &mut tx).await?;
        let result = match updated {
            Some(payment) => {
                debug!("🗃️ Payment #{} for intent {intent_id} canceled", payment.id);
                TransitionResult::Applied(payment)
            },
            None => TransitionResult::Unchanged(payments::fetch_payment_by_intent(intent_id, &mut tx).await?),
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn is_event_processed(&self, event_id: &str) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::event_exists(event_id, &mut conn).await?)
    }

    async fn record_dead_letter(&self, letter: NewDeadLetter) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::insert_dead_letter(letter, &mut conn).await?)
    }

    async fn fetch_dead_letters(&self) -> Result<Vec<DeadLetterEvent>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::fetch_dead_letters(&mut conn).await?)
    }

    async fn fetch_unreported_payments(
        &self,
        settled_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(notifications::fetch_unreported(settled_before.timestamp_millis(), limit, &mut conn).await?)
    }

    async fn mark_reported(&self, payment_id: i64) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        notifications::delete_unreported(payment_id, &mut conn).await?;
        Ok(())
    }
}

impl OwnerManagement for SqliteDatabase {
    async fn insert_owner(&self, owner: NewOwner) -> Result<Owner, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        owners::insert_owner(owner, &mut conn).await
    }

    async fn fetch_owner(&self, id: i64) -> Result<Option<Owner>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(owners::fetch_owner(id, &mut conn).await?)
    }

    async fn fetch_owner_by_public_key(&self, public_key: &str) -> Result<Option<Owner>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(owners::fetch_owner_by_public_key(public_key, &mut conn).await?)
    }

    async fn update_owner_urls(
        &self,
        id: i64,
        callback_url: Option<String>,
        redirect_url: Option<String>,
    ) -> Result<Owner, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        owners::update_owner_urls(id, callback_url, redirect_url, &mut conn).await
    }
}

impl CallbackQueue for SqliteDatabase {
    async fn enqueue(&self, job: &CallbackJob, policy: &RetryPolicy) -> Result<i64, QueueError> {
        let mut conn = self.pool.acquire().await?;
        callback_jobs::enqueue(job, policy.max_attempts, now_millis(), &mut conn).await
    }

    async fn claim_due(&self, limit: u32, visibility: Duration) -> Result<Vec<QueuedJob>, QueueError> {
        let mut conn = self.pool.acquire().await?;
        callback_jobs::claim_due(limit, visibility, now_millis(), &mut conn).await
    }

    async fn mark_completed(&self, id: i64) -> Result<(), QueueError> {
        let mut tx = self.pool.begin().await?;
        callback_jobs::mark_completed(id, now_millis(), &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str, policy: &RetryPolicy) -> Result<FailureOutcome, QueueError> {
        let mut tx = self.pool.begin().await?;
        let outcome = callback_jobs::mark_failed(id, error, policy, now_millis(), &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn prune(&self, retention: &RetentionPolicy) -> Result<u64, QueueError> {
        let mut conn = self.pool.acquire().await?;
        callback_jobs::prune(retention, &mut conn).await
    }

    async fn fetch_job(&self, id: i64) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.pool.acquire().await?;
        callback_jobs::fetch_job(id, &mut conn).await
    }
}

impl DistributedLock for SqliteDatabase {
    async fn try_acquire(&self, key: &str, holder: &str, lease: Duration) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let now = now_millis();
        let expires_at = now.saturating_add(i64::try_from(lease.as_millis()).unwrap_or(i64::MAX));
        Ok(locks::try_acquire(key, holder, expires_at, now, &mut conn).await?)
    }

    async fn release(&self, key: &str, holder: &str) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        if !locks::release(key, holder, &mut conn).await? {
            warn!("🗃️ Lock {key} was no longer held by {holder} when it was released");
        }
        Ok(())
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Migrations complete for {}", self.url);
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn count_jobs(&self, state: JobState) -> Result<i64, QueueError> {
        let mut conn = self.pool.acquire().await?;
        callback_jobs::count_in_state(state, &mut conn).await
    }
}
