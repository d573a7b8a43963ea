//! The card/wallet processor, as seen from the payment engine.
//!
//! The processor is an external collaborator. The engine only needs the handful of operations in
//! [`PaymentProcessor`], plus the ability to check webhook signatures ([`signature`]) and to decode the events it
//! pushes ([`events`]). [`StripeClient`] implements the trait against the Stripe REST API.
mod errors;
pub mod events;
mod objects;
pub mod signature;
mod stripe;

use std::collections::HashMap;

pub use errors::{ProcessorError, UNEXPECTED_STATE_CODE};
pub use events::{EventKind, EventParseError, ProcessorEvent};
pub use objects::{Intent, IntentStatus};
use pbg_common::MinorUnits;
pub use signature::{SignatureError, WebhookVerifier};
pub use stripe::{StripeClient, StripeConfig, DEFAULT_STRIPE_API_URL};

use crate::db_types::IntentId;

#[allow(async_fn_in_trait)]
pub trait PaymentProcessor {
    /// Creates an intent for `amount` (minor units) in `currency`, carrying `metadata`.
    async fn create_intent(
        &self,
        amount: MinorUnits,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Intent, ProcessorError>;

    async fn get_intent(&self, intent_id: &IntentId) -> Result<Intent, ProcessorError>;

    /// Cancels the intent. Fails with [`ProcessorError::UnexpectedState`] if the intent can no longer be canceled.
    async fn cancel_intent(&self, intent_id: &IntentId) -> Result<Intent, ProcessorError>;

    /// Replaces the intent metadata with `metadata`.
    async fn update_intent_metadata(
        &self,
        intent_id: &IntentId,
        metadata: HashMap<String, String>,
    ) -> Result<Intent, ProcessorError>;

    /// Looks up the wallet brand (`applepay`, `googlepay`) that paid for the intent. Returns `None` if the intent was
    /// not paid with a known wallet, or if the lookup fails.
    async fn resolve_wallet_type(&self, intent_id: &IntentId) -> Option<String>;
}
