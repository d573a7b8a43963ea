use std::collections::HashMap;

use pbg_common::MinorUnits;
use serde::{Deserialize, Serialize};

use crate::db_types::{IntentId, PaymentMetadata};

/// The processor-side lifecycle of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    /// True while the intent has neither succeeded nor been canceled.
    pub fn is_in_flight(&self) -> bool {
        !matches!(self, IntentStatus::Succeeded | IntentStatus::Canceled)
    }
}

/// A payment intent, as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub id: IntentId,
    pub status: IntentStatus,
    /// In minor units
    pub amount: MinorUnits,
    /// The processor reports currencies in lower case
    pub currency: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl Intent {
    pub fn payment_metadata(&self) -> PaymentMetadata {
        PaymentMetadata::from_map(&self.metadata)
    }

    pub fn currency_code(&self) -> String {
        self.currency.trim().to_uppercase()
    }
}
