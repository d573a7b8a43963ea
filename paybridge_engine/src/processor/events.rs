use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::processor::Intent;

pub const INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const INTENT_FAILED: &str = "payment_intent.payment_failed";
pub const INTENT_CANCELED: &str = "payment_intent.canceled";

#[derive(Debug, Clone, Error)]
pub enum EventParseError {
    #[error("The event body is not a valid event: {0}")]
    InvalidEnvelope(String),
    #[error("The {event_type} event does not carry a valid intent: {reason}")]
    InvalidIntent { event_type: String, reason: String },
}

/// The processor event kinds this service acts on. Anything else is carried as `Unrecognized` so that new event
/// types are acknowledged without being acted upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    IntentSucceeded(Intent),
    IntentFailed(Intent),
    IntentCanceled(Intent),
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorEvent {
    pub id: String,
    pub kind: EventKind,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: RawEventData,
}

#[derive(Deserialize, Default)]
struct RawEventData {
    #[serde(default)]
    object: Value,
}

impl ProcessorEvent {
    pub fn from_slice(raw: &[u8]) -> Result<Self, EventParseError> {
        let RawEvent { id, event_type, data } =
            serde_json::from_slice(raw).map_err(|e| EventParseError::InvalidEnvelope(e.to_string()))?;
        let intent = |object: Value| {
            serde_json::from_value::<Intent>(object)
                .map_err(|e| EventParseError::InvalidIntent { event_type: event_type.clone(), reason: e.to_string() })
        };
        let kind = match event_type.as_str() {
            INTENT_SUCCEEDED => EventKind::IntentSucceeded(intent(data.object)?),
            INTENT_FAILED => EventKind::IntentFailed(intent(data.object)?),
            INTENT_CANCELED => EventKind::IntentCanceled(intent(data.object)?),
            _ => EventKind::Unrecognized(event_type.clone()),
        };
        Ok(Self { id, kind })
    }

    pub fn event_type(&self) -> &str {
        match &self.kind {
            EventKind::IntentSucceeded(_) => INTENT_SUCCEEDED,
            EventKind::IntentFailed(_) => INTENT_FAILED,
            EventKind::IntentCanceled(_) => INTENT_CANCELED,
            EventKind::Unrecognized(t) => t.as_str(),
        }
    }

    pub fn intent(&self) -> Option<&Intent> {
        match &self.kind {
            EventKind::IntentSucceeded(i) | EventKind::IntentFailed(i) | EventKind::IntentCanceled(i) => Some(i),
            EventKind::Unrecognized(_) => None,
        }
    }
}
