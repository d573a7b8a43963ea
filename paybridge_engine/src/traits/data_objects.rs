use std::{fmt::Display, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use pbg_common::MinorUnits;
use serde::{Deserialize, Serialize};

use crate::{
    callbacks::CallbackJob,
    db_types::{ConversionError, IntentId, Payment, PaymentMetadata, PaymentStatus},
};

/// The terminal outcome a processor reported for an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Completed,
    Failed,
}

impl SettlementOutcome {
    pub fn status(&self) -> PaymentStatus {
        match self {
            SettlementOutcome::Completed => PaymentStatus::Completed,
            SettlementOutcome::Failed => PaymentStatus::Failed,
        }
    }
}

/// Everything needed to settle a payment for an intent, including what is needed to create the local record if the
/// processor event arrives before the checkout had a chance to write it.
#[derive(Debug, Clone)]
pub struct IntentSettlement {
    pub intent_id: IntentId,
    pub outcome: SettlementOutcome,
    pub amount: MinorUnits,
    pub currency: String,
    pub metadata: PaymentMetadata,
    /// The resolved payment-method subtype. Replaces the stored one when present.
    pub payment_type: Option<String>,
}

/// The result of applying a processor-driven transition to a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// The payment moved into a new status (or was created directly in it). Carries the updated record.
    Applied(Payment),
    /// Nothing changed, because the payment is already terminal, or there is no payment for the intent.
    Unchanged(Option<Payment>),
    /// The event id is already in the ledger. Nothing was applied.
    DuplicateEvent,
}

impl TransitionResult {
    pub fn applied(&self) -> Option<&Payment> {
        match self {
            TransitionResult::Applied(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionResult::Applied(_))
    }
}

#[derive(Debug, Clone)]
pub struct NewDeadLetter {
    pub event_id: String,
    pub event_type: String,
    pub intent_id: Option<IntentId>,
    pub reason: String,
    pub payload: String,
}

//--------------------------------------    Callback queue     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting for `next_attempt_at` to pass
    Waiting,
    /// Claimed by a worker. Becomes claimable again once its visibility timeout lapses.
    Active,
    Completed,
    /// Exhausted all attempts. Never redelivered.
    Failed,
}

impl Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for JobState {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ConversionError::from(format!("Invalid job state: {s}"))),
        }
    }
}

/// A callback job as stored in the durable queue.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: i64,
    pub job: CallbackJob,
    pub state: JobState,
    /// The number of failed delivery attempts so far
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// What the queue did with a job after a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The job will be offered again after `delay`.
    Retry { attempt: u32, delay: Duration, next_attempt_at: DateTime<Utc> },
    /// The job ran out of attempts and moved to the failed set.
    Dead { attempts: u32 },
}
