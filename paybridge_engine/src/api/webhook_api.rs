//! Turns processor webhooks into payment state transitions.
//!
//! Every event is applied at most once. The event id goes into the processed-event ledger in the same transaction as
//! the payment mutation it guards, so a redelivered event (or the same event arriving at two instances at once) finds
//! its id already taken and is acknowledged without side effects.
use std::fmt::Debug;

use log::*;
use serde::Serialize;

use crate::{
    api::{
        errors::WebhookError,
        exchange_rate_api::RateResolver,
        notifications::{notify_partner, resolve_payment_type},
    },
    callbacks::{CallbackDispatch, CallbackMethod},
    processor::{EventKind, Intent, PaymentProcessor, ProcessorEvent, WebhookVerifier},
    traits::{IntentSettlement, NewDeadLetter, PaymentGatewayDatabase, SettlementOutcome, TransitionResult},
};

/// The body returned to the processor for every accepted webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

impl Default for WebhookAck {
    fn default() -> Self {
        Self { received: true }
    }
}

/// What happened to an accepted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The payment moved to a terminal status. `notified` says whether a partner callback was dispatched.
    Applied { payment_id: i64, notified: bool },
    /// The event id was already in the ledger.
    Duplicate,
    /// The event was recorded, but the payment was already terminal (or, for cancellations, absent).
    Unchanged,
    /// The event could not be tied to an owner and was parked in the dead-letter ledger.
    DeadLettered,
    /// An event type this service does not act on.
    Ignored(String),
}

impl WebhookOutcome {
    pub fn ack(&self) -> WebhookAck {
        WebhookAck::default()
    }
}

pub struct WebhookEventProcessor<B, P, D> {
    db: B,
    processor: P,
    dispatcher: D,
    verifier: WebhookVerifier,
    rates: RateResolver,
}

impl<B, P, D> Debug for WebhookEventProcessor<B, P, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookEventProcessor")
    }
}

impl<B, P, D> WebhookEventProcessor<B, P, D>
where
    B: PaymentGatewayDatabase,
    P: PaymentProcessor,
    D: CallbackDispatch,
{
    pub fn new(db: B, processor: P, dispatcher: D, verifier: WebhookVerifier, rates: RateResolver) -> Self {
        Self { db, processor, dispatcher, verifier, rates }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Verifies and applies one webhook delivery.
    ///
    /// `raw` must be the request body exactly as received. Any error other than [`WebhookError::Backend`] means the
    /// request was rejected without touching any state.
    pub async fn handle(&self, raw: &[u8], signature: Option<&str>) -> Result<WebhookOutcome, WebhookError> {
        if !self.verifier.is_configured() {
            error!("🪝️ A webhook arrived, but no webhook signing secret is configured");
            return Err(WebhookError::SecretNotConfigured);
        }
        if raw.is_empty() {
            return Err(WebhookError::MissingBody);
        }
        self.verifier.verify(raw, signature.unwrap_or_default()).map_err(|e| {
            warn!("🪝️ Webhook signature verification failed: {e}");
            WebhookError::from(e)
        })?;
        let event = ProcessorEvent::from_slice(raw)?;
        match event.intent() {
            Some(intent) => debug!("🪝️ Received {} event {} for intent {}", event.event_type(), event.id, intent.id),
            None => debug!("🪝️ Received {} event {}", event.event_type(), event.id),
        }
        match &event.kind {
            EventKind::IntentSucceeded(intent) => {
                self.settle(&event, intent, SettlementOutcome::Completed, raw).await
            },
            EventKind::IntentFailed(intent) => self.settle(&event, intent, SettlementOutcome::Failed, raw).await,
            EventKind::IntentCanceled(intent) => self.cancel(&event, intent).await,
            EventKind::Unrecognized(event_type) => {
                info!("🪝️ Unhandled event type: {event_type} ({}). Acknowledging.", event.id);
                Ok(WebhookOutcome::Ignored(event_type.clone()))
            },
        }
    }

    async fn settle(
        &self,
        event: &ProcessorEvent,
        intent: &Intent,
        outcome: SettlementOutcome,
        raw: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        // Cheap early exit. The ledger insert inside the transaction is what actually guarantees idempotency.
        if self.db.is_event_processed(&event.id).await? {
            info!("🪝️ Event {} has already been processed. Skipping.", event.id);
            return Ok(WebhookOutcome::Duplicate);
        }
        let metadata = intent.payment_metadata();
        let payment_type = resolve_payment_type(&self.processor, &intent.id, metadata.payment_type.as_deref()).await;
        let settlement = IntentSettlement {
            intent_id: intent.id.clone(),
            outcome,
            amount: intent.amount,
            currency: intent.currency_code(),
            metadata,
            payment_type,
        };
        match self.db.settle_intent(Some(&event.id), settlement).await {
            Ok(TransitionResult::Applied(payment)) => {
                info!("🪝️ Payment #{} for intent {} is now {}", payment.id, intent.id, payment.status);
                let method = match outcome {
                    SettlementOutcome::Completed => CallbackMethod::Pay,
                    SettlementOutcome::Failed => CallbackMethod::Error,
                };
                let notified = notify_partner(&self.db, &self.dispatcher, &self.rates, &payment, method).await;
                Ok(WebhookOutcome::Applied { payment_id: payment.id, notified })
            },
            Ok(TransitionResult::DuplicateEvent) => {
                info!("🪝️ Event {} has already been processed. Skipping.", event.id);
                Ok(WebhookOutcome::Duplicate)
            },
            Ok(TransitionResult::Unchanged(_)) => Ok(WebhookOutcome::Unchanged),
            Err(e) if e.is_unresolvable_owner() => {
                warn!("🪝️ Event {} for intent {} cannot be applied: {e}. Moving it to the dead-letter ledger.", event.id, intent.id);
                let letter = NewDeadLetter {
                    event_id: event.id.clone(),
                    event_type: event.event_type().to_string(),
                    intent_id: Some(intent.id.clone()),
                    reason: e.to_string(),
                    payload: String::from_utf8_lossy(raw).into_owned(),
                };
                self.db.record_dead_letter(letter).await?;
                Ok(WebhookOutcome::DeadLettered)
            },
            Err(e) => {
                error!("🪝️ Could not apply event {} for intent {}: {e}", event.id, intent.id);
                Err(WebhookError::Backend(e))
            },
        }
    }

    async fn cancel(&self, event: &ProcessorEvent, intent: &Intent) -> Result<WebhookOutcome, WebhookError> {
        match self.db.cancel_pending_intent(Some(&event.id), &intent.id).await? {
            TransitionResult::Applied(payment) => {
                info!("🪝️ Payment #{} for intent {} canceled by the processor", payment.id, intent.id);
                Ok(WebhookOutcome::Applied { payment_id: payment.id, notified: false })
            },
            TransitionResult::DuplicateEvent => {
                info!("🪝️ Event {} has already been processed. Skipping.", event.id);
                Ok(WebhookOutcome::Duplicate)
            },
            TransitionResult::Unchanged(payment) => {
                debug!(
                    "🪝️ Cancellation of intent {} left the local record as is ({:?})",
                    intent.id,
                    payment.map(|p| p.status)
                );
                Ok(WebhookOutcome::Unchanged)
            },
        }
    }
}
