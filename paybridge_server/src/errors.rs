use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use paybridge_engine::{PaymentFlowError, WebhookError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Requests from this address are not allowed.")]
    ForbiddenPeer,
    /// A webhook delivery that can never succeed as sent. The processor gets the message as plain text.
    #[error("{0}")]
    WebhookRejected(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Payment processor error. {0}")]
    ProcessorError(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::WebhookRejected(_) => StatusCode::BAD_REQUEST,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ForbiddenPeer => StatusCode::FORBIDDEN,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ProcessorError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Self::WebhookRejected(msg) => {
                HttpResponse::build(self.status_code()).insert_header(ContentType::plaintext()).body(msg.clone())
            },
            _ => HttpResponse::build(self.status_code())
                .insert_header(ContentType::json())
                .body(serde_json::json!({ "error": self.to_string() }).to_string()),
        }
    }
}

impl From<WebhookError> for ServerError {
    fn from(e: WebhookError) -> Self {
        if e.is_bad_request() {
            Self::WebhookRejected(e.to_string())
        } else {
            error!("💻️ Webhook could not be applied and will be redelivered. {e}");
            Self::BackendError(e.to_string())
        }
    }
}

impl From<PaymentFlowError> for ServerError {
    fn from(e: PaymentFlowError) -> Self {
        match e {
            PaymentFlowError::MissingIntent
            | PaymentFlowError::InvalidIntent(_)
            | PaymentFlowError::MissingPublicKey
            | PaymentFlowError::PartnerUrlsNotConfigured
            | PaymentFlowError::InvalidAmount(_)
            | PaymentFlowError::MissingPaymentType
            | PaymentFlowError::NotSucceeded(_) => Self::BadRequest(e.to_string()),
            PaymentFlowError::UnknownOwner => Self::Forbidden(e.to_string()),
            PaymentFlowError::RedirectNotConfigured => Self::ConfigurationError(e.to_string()),
            PaymentFlowError::Processor(e) => Self::ProcessorError(e.to_string()),
            PaymentFlowError::Database(e) => Self::BackendError(format!("Database error: {e}")),
        }
    }
}
