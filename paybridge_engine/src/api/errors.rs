use thiserror::Error;

use crate::{
    processor::{EventParseError, ProcessorError, SignatureError},
    traits::PaymentGatewayError,
};

#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    #[error("Webhook secret not configured")]
    SecretNotConfigured,
    #[error("Webhook Error: Missing raw body")]
    MissingBody,
    #[error("Webhook Error: {0}")]
    Signature(#[from] SignatureError),
    #[error("Webhook Error: {0}")]
    InvalidPayload(#[from] EventParseError),
    #[error("Could not apply the webhook event: {0}")]
    Backend(#[from] PaymentGatewayError),
}

impl WebhookError {
    /// True for errors caused by the request itself. These are never worth redelivering as-is.
    pub fn is_bad_request(&self) -> bool {
        !matches!(self, WebhookError::Backend(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentFlowError {
    #[error("Missing payment_intent")]
    MissingIntent,
    #[error("Invalid payment_intent: {0}")]
    InvalidIntent(String),
    #[error("Missing public_key")]
    MissingPublicKey,
    #[error("Invalid public_key")]
    UnknownOwner,
    #[error("Redirect URL and Callback URL must both be configured in account settings")]
    PartnerUrlsNotConfigured,
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("A payment type is required")]
    MissingPaymentType,
    #[error("Payment not completed. Redirect status: {0}")]
    NotSucceeded(String),
    #[error("Redirect URL not configured")]
    RedirectNotConfigured,
    #[error("Payment processor error: {0}")]
    Processor(#[from] ProcessorError),
    #[error("Database error: {0}")]
    Database(#[from] PaymentGatewayError),
}
