use std::{collections::HashMap, sync::Arc, time::Duration};

use log::*;
use pbg_common::{MinorUnits, Secret};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
    Method,
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::{
    db_types::IntentId,
    processor::{errors::UNEXPECTED_STATE_CODE, Intent, PaymentProcessor, ProcessorError},
};

pub const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com";

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub api_url: String,
    pub secret_key: Secret<String>,
    pub timeout: Duration,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_STRIPE_API_URL.to_string(),
            secret_key: Secret::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct StripeClient {
    config: StripeConfig,
    client: Arc<Client>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Result<Self, ProcessorError> {
        let mut headers = HeaderMap::with_capacity(1);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let mut val = HeaderValue::from_str(&bearer).map_err(|e| ProcessorError::Initialization(e.to_string()))?;
        val.set_sensitive(true);
        headers.insert(AUTHORIZATION, val);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProcessorError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.config.api_url.trim_end_matches('/'))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        form: &[(String, String)],
    ) -> Result<T, ProcessorError> {
        let url = self.url(path);
        trace!("Sending processor request: {method} {url}");
        let mut req = self.client.request(method, url);
        if !query.is_empty() {
            req = req.query(query);
        }
        if !form.is_empty() {
            req = req.form(form);
        }
        let response = req.send().await.map_err(|e| ProcessorError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            response.json::<T>().await.map_err(|e| ProcessorError::InvalidResponse(e.to_string()))
        } else {
            let body = response.text().await.map_err(|e| ProcessorError::Transport(e.to_string()))?;
            Err(api_error(status, &body))
        }
    }
}

fn api_error(status: StatusCode, body: &str) -> ProcessorError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ProcessorError::RateLimited;
    }
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => (error.code, error.message.unwrap_or_default()),
        Err(_) => (None, body.to_string()),
    };
    if code.as_deref() == Some(UNEXPECTED_STATE_CODE) {
        return ProcessorError::UnexpectedState(message);
    }
    ProcessorError::Api { status: status.as_u16(), code, message }
}

/// The API path of an intent, with an optional action appended. The id is checked before it goes anywhere near the URL,
/// so a crafted id cannot point a request at some other object.
fn intent_path(intent_id: &IntentId, action: Option<&str>) -> Result<String, ProcessorError> {
    if !intent_id.is_well_formed() {
        warn!("Refusing to send a processor request for malformed intent id '{intent_id}'");
        return Err(ProcessorError::InvalidIntentId(intent_id.to_string()));
    }
    Ok(match action {
        Some(action) => format!("/payment_intents/{intent_id}/{action}"),
        None => format!("/payment_intents/{intent_id}"),
    })
}

fn metadata_form(metadata: &HashMap<String, String>) -> impl Iterator<Item = (String, String)> + '_ {
    metadata.iter().map(|(k, v)| (format!("metadata[{k}]"), v.clone()))
}

/// Maps the processor's wallet type names onto the payment types partners know.
pub(crate) fn wallet_payment_type(wallet_type: &str) -> Option<String> {
    match wallet_type {
        "apple_pay" => Some("applepay".to_string()),
        "google_pay" => Some("googlepay".to_string()),
        _ => None,
    }
}

impl PaymentProcessor for StripeClient {
    async fn create_intent(
        &self,
        amount: MinorUnits,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Intent, ProcessorError> {
        let mut form = vec![
            ("amount".to_string(), amount.value().to_string()),
            ("currency".to_string(), currency.trim().to_lowercase()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        form.extend(metadata_form(&metadata));
        let intent: Intent = self.request(Method::POST, "/payment_intents", &[], &form).await?;
        info!("Created payment intent {} for {amount} {currency}", intent.id);
        Ok(intent)
    }

    async fn get_intent(&self, intent_id: &IntentId) -> Result<Intent, ProcessorError> {
        let path = intent_path(intent_id, None)?;
        self.request(Method::GET, &path, &[], &[]).await
    }

    async fn cancel_intent(&self, intent_id: &IntentId) -> Result<Intent, ProcessorError> {
        let path = intent_path(intent_id, Some("cancel"))?;
        let intent: Intent = self.request(Method::POST, &path, &[], &[]).await?;
        info!("Canceled payment intent {intent_id}");
        Ok(intent)
    }

    async fn update_intent_metadata(
        &self,
        intent_id: &IntentId,
        metadata: HashMap<String, String>,
    ) -> Result<Intent, ProcessorError> {
        let path = intent_path(intent_id, None)?;
        let form = metadata_form(&metadata).collect::<Vec<_>>();
        self.request(Method::POST, &path, &[], &form).await
    }

    async fn resolve_wallet_type(&self, intent_id: &IntentId) -> Option<String> {
        let result = match intent_path(intent_id, None) {
            Ok(path) => self.request::<Value>(Method::GET, &path, &[("expand[]", "payment_method")], &[]).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(intent) => {
                let wallet = intent["payment_method"]["card"]["wallet"]["type"].as_str();
                trace!("Wallet type for {intent_id}: {wallet:?}");
                wallet.and_then(wallet_payment_type)
            },
            Err(e) => {
                warn!("Could not resolve the wallet type for {intent_id}: {e}");
                None
            },
        }
    }
}
