use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{DeadLetterEvent, IntentId, NewPayment, Payment},
    traits::{
        data_objects::{IntentSettlement, NewDeadLetter, TransitionResult},
        OwnerManagement,
    },
};

/// This trait defines the highest level of behaviour for storage backends supporting the payment engine.
///
/// This behaviour includes:
/// * Creating and querying payment records
/// * Applying processor-driven status transitions, guarded by the processed-event ledger
/// * Parking events that cannot be applied in the dead-letter ledger
///
/// Payment statuses only move forward. Implementations must guard every status update on the current status being
/// `pending`, so that concurrent or out-of-order writers can never resurrect or overwrite a terminal payment.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + OwnerManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new payment record. Fails if a record for the intent already exists.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, PaymentGatewayError>;

    async fn fetch_payment(&self, id: i64) -> Result<Option<Payment>, PaymentGatewayError>;

    async fn fetch_payment_by_intent(&self, intent_id: &IntentId) -> Result<Option<Payment>, PaymentGatewayError>;

    /// Fetches up to `limit` pending payments that have an intent id, oldest first.
    async fn fetch_pending_payments(&self, limit: u32) -> Result<Vec<Payment>, PaymentGatewayError>;

    async fn fetch_completed_payments_for_owner(&self, owner_id: i64) -> Result<Vec<Payment>, PaymentGatewayError>;

    /// Records the payment-method subtype the payer picked at checkout. Returns `None` if there is no payment for the
    /// intent.
    async fn update_payment_type(
        &self,
        intent_id: &IntentId,
        payment_type: &str,
    ) -> Result<Option<Payment>, PaymentGatewayError>;

    /// Moves the payment for an intent into `completed` or `failed`, in a single atomic transaction:
    /// * If `event_id` is given, it is inserted into the processed-event ledger first. If it is already there,
    ///   [`TransitionResult::DuplicateEvent`] is returned and nothing else happens.
    /// * If a pending payment exists, it is updated to the new status, and its description and payment type are
    ///   refreshed.
    /// * If the payment is already terminal, nothing changes.
    /// * Whenever the payment moves, it is also flagged as unreported (see [`Self::fetch_unreported_payments`]) in the
    ///   same transaction.
    /// * If there is no payment for the intent, one is created from the settlement metadata. The metadata must carry the
    ///   public key of a known owner, otherwise the whole transaction is rolled back and
    ///   [`PaymentGatewayError::MissingOwnerReference`] or [`PaymentGatewayError::UnknownOwner`] is returned.
    async fn settle_intent(
        &self,
        event_id: Option<&str>,
        settlement: IntentSettlement,
    ) -> Result<TransitionResult, PaymentGatewayError>;

    /// Moves the payment for an intent from `pending` to `canceled`. Any other current status is left alone. As with
    /// [`Self::settle_intent`], the ledger entry for `event_id` (if given) is written in the same transaction.
    async fn cancel_pending_intent(
        &self,
        event_id: Option<&str>,
        intent_id: &IntentId,
    ) -> Result<TransitionResult, PaymentGatewayError>;

    async fn is_event_processed(&self, event_id: &str) -> Result<bool, PaymentGatewayError>;

    /// Parks an event that could not be applied. Returns `false` if the event was already parked.
    async fn record_dead_letter(&self, letter: NewDeadLetter) -> Result<bool, PaymentGatewayError>;

    async fn fetch_dead_letters(&self) -> Result<Vec<DeadLetterEvent>, PaymentGatewayError>;

    /// Fetches up to `limit` payments that were settled before `settled_before` but never handed to the callback
    /// dispatcher, oldest first. These are left behind when a process dies between the settlement and the dispatch.
    async fn fetch_unreported_payments(
        &self,
        settled_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Payment>, PaymentGatewayError>;

    /// Clears the unreported flag once the partner notification for `payment_id` has been dispatched.
    async fn mark_reported(&self, payment_id: i64) -> Result<(), PaymentGatewayError>;
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("A payment for intent {0} already exists")]
    PaymentAlreadyExists(IntentId),
    #[error("The event for intent {0} carries no owner reference, so a payment record cannot be created")]
    MissingOwnerReference(IntentId),
    #[error("The owner with public key {0} does not exist")]
    UnknownOwner(String),
    #[error("The requested owner id {0} does not exist")]
    OwnerNotFound(i64),
    #[error("An owner with public key {0} already exists")]
    OwnerAlreadyExists(String),
    #[error("Illegal payment status change. {0}")]
    PaymentStatusUpdateError(String),
}

impl PaymentGatewayError {
    /// True for errors that mean the event itself can never be applied, as opposed to transient storage failures.
    pub fn is_unresolvable_owner(&self) -> bool {
        matches!(self, Self::MissingOwnerReference(_) | Self::UnknownOwner(_))
    }
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}
