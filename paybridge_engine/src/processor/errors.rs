use thiserror::Error;

/// The error code the processor uses when an intent cannot be modified because of the state it is in. During
/// cancellation this usually means the payment succeeded (or is being processed) concurrently.
pub const UNEXPECTED_STATE_CODE: &str = "payment_intent_unexpected_state";

#[derive(Debug, Clone, Error)]
pub enum ProcessorError {
    #[error("Could not initialize processor client: {0}")]
    Initialization(String),
    #[error("Could not reach the processor: {0}")]
    Transport(String),
    #[error("Invalid processor response: {0}")]
    InvalidResponse(String),
    #[error("The intent is in an unexpected state: {0}")]
    UnexpectedState(String),
    #[error("'{0}' is not a valid intent id")]
    InvalidIntentId(String),
    #[error("The processor is rate limiting requests")]
    RateLimited,
    #[error("Processor request failed. Error {status}. {message}")]
    Api { status: u16, code: Option<String>, message: String },
}

impl ProcessorError {
    pub fn is_unexpected_state(&self) -> bool {
        matches!(self, ProcessorError::UnexpectedState(_))
    }
}
