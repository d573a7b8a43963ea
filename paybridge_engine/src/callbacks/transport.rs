use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    Client,
};
use thiserror::Error;

use crate::callbacks::CallbackJob;

#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("Could not initialize the callback client: {0}")]
    Initialization(String),
    #[error("Callback {method} could not be sent: {reason}")]
    Transport { method: String, reason: String },
    #[error("Callback {method} failed: {status}")]
    Rejected { method: String, status: u16 },
}

/// Delivers one callback to the partner. A 2xx response is the only success signal.
#[allow(async_fn_in_trait)]
pub trait CallbackTransport: Clone {
    async fn deliver(&self, job: &CallbackJob) -> Result<(), DeliveryError>;
}

/// Calls the partner endpoint with a `GET` carrying the parameters as a query string.
#[derive(Clone)]
pub struct HttpCallbackTransport {
    client: Arc<Client>,
}

impl HttpCallbackTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self, DeliveryError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| DeliveryError::Initialization(e.to_string()))?;
        Ok(Self { client: Arc::new(client) })
    }
}

impl CallbackTransport for HttpCallbackTransport {
    async fn deliver(&self, job: &CallbackJob) -> Result<(), DeliveryError> {
        let url = job.target_url();
        trace!("📮️ Calling partner: {url}");
        let response = self.client.get(url).send().await.map_err(|e| DeliveryError::Transport {
            method: job.method.to_string(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        if status.is_success() {
            debug!("📮️ Callback {} to {} acknowledged with {status}", job.method, job.callback_url);
            Ok(())
        } else {
            Err(DeliveryError::Rejected { method: job.method.to_string(), status: status.as_u16() })
        }
    }
}
