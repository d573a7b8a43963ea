use std::{collections::HashMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use pbg_common::MinorUnits;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

impl From<String> for ConversionError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

//--------------------------------------        IntentId        ---------------------------------------------------------
/// The identifier the processor assigned to a payment intent, e.g. `pi_3NkR...`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct IntentId(pub String);

impl IntentId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the id only uses the characters the processor puts in its object ids (ASCII letters, digits and `_`).
    /// Ids that fail this check must never be placed in a processor URL.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty() && self.0.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

impl FromStr for IntentId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConversionError("An intent id cannot be empty".into()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for IntentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for IntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
/// The local status of a payment attempt.
///
/// Statuses only ever move forward. `Pending` is the single non-terminal state, and the only legal transitions are
/// from `Pending` into one of the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// An intent exists at the processor, but its outcome has not been observed yet.
    Pending,
    /// The processor reported the payment as succeeded.
    Completed,
    /// The processor reported the payment as failed.
    Failed,
    /// The intent was canceled, either by the processor or by the expiry sweep.
    Canceled,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(self, PaymentStatus::Pending) && next.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment status: {value}. But this conversion cannot fail. Defaulting to pending");
            PaymentStatus::Pending
        })
    }
}

//--------------------------------------        Owner          ---------------------------------------------------------
/// The account on whose behalf payments are collected. Partners identify it with a public key, and configure where
/// outcome notifications (callback) and the payer's browser (redirect) should go.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Owner {
    pub id: i64,
    pub public_key: String,
    pub callback_url: Option<String>,
    pub redirect_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Owner {
    /// The callback URL, if one is configured and not blank.
    pub fn callback_target(&self) -> Option<&str> {
        self.callback_url.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// The redirect URL, if one is configured and not blank.
    pub fn redirect_target(&self) -> Option<&str> {
        self.redirect_url.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// A checkout may only start once both partner URLs are configured.
    pub fn can_accept_payments(&self) -> bool {
        self.callback_target().is_some() && self.redirect_target().is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewOwner {
    pub public_key: String,
    pub callback_url: Option<String>,
    pub redirect_url: Option<String>,
}

impl NewOwner {
    pub fn new<S: Into<String>>(public_key: S) -> Self {
        Self { public_key: public_key.into(), ..Default::default() }
    }

    pub fn with_callback_url<S: Into<String>>(mut self, url: S) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    pub fn with_redirect_url<S: Into<String>>(mut self, url: S) -> Self {
        self.redirect_url = Some(url.into());
        self
    }
}

//--------------------------------------        Payment        ---------------------------------------------------------
/// One payment attempt. Rows are never deleted; they form the financial audit trail.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    /// The local payment id. Partners receive it as `localpayId`.
    pub id: i64,
    pub intent_id: Option<IntentId>,
    pub owner_id: i64,
    pub amount: MinorUnits,
    /// Upper-cased ISO currency code
    pub currency: String,
    pub status: PaymentStatus,
    /// The payer's account reference at the partner
    pub pay_account: Option<String>,
    pub ordernum: Option<String>,
    pub description: Option<String>,
    /// The resolved payment-method subtype, e.g. `visa`, `applepay`
    pub payment_type: Option<String>,
    pub project: Option<String>,
    /// The partner-supplied `sum` field, echoed back verbatim in callbacks
    pub sum: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewPayment      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub intent_id: IntentId,
    pub owner_id: i64,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: PaymentStatus,
    pub metadata: PaymentMetadata,
    pub created_at: DateTime<Utc>,
}

impl NewPayment {
    pub fn new(intent_id: IntentId, owner_id: i64, amount: MinorUnits, currency: &str) -> Self {
        Self {
            intent_id,
            owner_id,
            amount,
            currency: currency.trim().to_uppercase(),
            status: PaymentStatus::Pending,
            metadata: PaymentMetadata::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: PaymentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_metadata(mut self, metadata: PaymentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------    PaymentMetadata    ---------------------------------------------------------
/// The partner-supplied fields that travel with an intent as processor metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    pub public_key: Option<String>,
    pub account: Option<String>,
    pub ordernum: Option<String>,
    pub description: Option<String>,
    pub project: Option<String>,
    pub sum: Option<String>,
    pub payment_type: Option<String>,
}

pub const META_PUBLIC_KEY: &str = "public_key";
pub const META_ACCOUNT: &str = "account";
pub const META_ORDERNUM: &str = "ordernum";
pub const META_DESC: &str = "desc";
pub const META_PROJECT: &str = "project";
pub const META_SUM: &str = "sum";
pub const META_PAYMENT_TYPE: &str = "paymentType";

impl PaymentMetadata {
    /// Reads the known keys from a processor metadata map. Blank values are treated as absent.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| map.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()).map(String::from);
        Self {
            public_key: get(META_PUBLIC_KEY),
            account: get(META_ACCOUNT),
            ordernum: get(META_ORDERNUM),
            description: get(META_DESC),
            project: get(META_PROJECT),
            sum: get(META_SUM),
            payment_type: get(META_PAYMENT_TYPE),
        }
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        [
            (META_PUBLIC_KEY, &self.public_key),
            (META_ACCOUNT, &self.account),
            (META_ORDERNUM, &self.ordernum),
            (META_DESC, &self.description),
            (META_PROJECT, &self.project),
            (META_SUM, &self.sum),
            (META_PAYMENT_TYPE, &self.payment_type),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k.to_string(), v.clone())))
        .collect()
    }
}

//--------------------------------------    ProcessedEvent     ---------------------------------------------------------
/// An entry in the idempotency ledger. Existence of a row means the event has been fully applied.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub processed_at: DateTime<Utc>,
}

//--------------------------------------    DeadLetterEvent    ---------------------------------------------------------
/// A processor event that could not be applied and will not be retried, kept for manual follow-up.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DeadLetterEvent {
    pub event_id: String,
    pub event_type: String,
    pub intent_id: Option<IntentId>,
    pub reason: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}
