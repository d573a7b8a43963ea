use paybridge_engine::{db_types::IntentId, CheckoutSession};
use serde::{Deserialize, Serialize};

/// Returned to the checkout page after an intent has been opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub payment_id: i64,
    pub payment_intent_id: IntentId,
    pub client_secret: Option<String>,
    /// Amount in major units, two decimals.
    pub amount: String,
    pub currency: String,
    pub publishable_key: String,
}

impl CheckoutResponse {
    pub fn new(session: CheckoutSession, publishable_key: &str) -> Self {
        Self {
            payment_id: session.payment_id,
            payment_intent_id: session.intent_id,
            client_secret: session.client_secret,
            amount: session.amount.to_string(),
            currency: session.currency,
            publishable_key: publishable_key.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMethodRequest {
    pub payment_intent_id: String,
    #[serde(default)]
    pub payment_type: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl Default for OkResponse {
    fn default() -> Self {
        Self { ok: true }
    }
}

/// Query parameters the processor appends to the checkout return URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessQuery {
    pub payment_intent: Option<String>,
    pub redirect_status: Option<String>,
}

/// Non-secret processor settings the checkout page needs.
#[derive(Debug, Clone, Default)]
pub struct CheckoutKeys {
    pub publishable_key: String,
}
