//! The payment engine's public API surfaces.
//!
//! * [`webhook_api`] applies processor events to payment records.
//! * [`reconciliation_api`] repairs records the webhooks never confirmed.
//! * [`payment_flow_api`] covers the checkout side: opening intents and redirecting payers back to partners.
//! * [`exchange_rate_api`] converts payment amounts into EUR revenue figures.
pub mod errors;
pub mod exchange_rate_api;
pub mod notifications;
pub mod payment_flow_api;
pub mod reconciliation_api;
pub mod webhook_api;

pub use errors::{PaymentFlowError, WebhookError};
pub use exchange_rate_api::{EnvRateOverrides, RateOverrides, RateResolver, StaticRateOverrides};
pub use payment_flow_api::{CheckoutRequest, CheckoutSession, PaymentFlowApi};
pub use reconciliation_api::{ReconciliationSweep, SweepConfig, SweepOutcome, SweepReport};
pub use webhook_api::{WebhookAck, WebhookEventProcessor, WebhookOutcome};
