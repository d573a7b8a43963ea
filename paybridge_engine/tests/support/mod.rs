#![allow(dead_code)]
use chrono::Utc;
use paybridge_engine::{
    api::StaticRateOverrides,
    db_types::{NewOwner, Owner},
    processor::WebhookVerifier,
    test_utils::{FakeProcessor, RecordingDispatcher},
    OwnerManagement,
    RateResolver,
    SqliteDatabase,
    WebhookEventProcessor,
};
use pbg_common::Secret;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const PUBLIC_KEY: &str = "pk_partner_0001";
pub const CALLBACK_URL: &str = "https://partner.example/callback";
pub const REDIRECT_URL: &str = "https://partner.example/done?lang=en";

pub type TestProcessor = WebhookEventProcessor<SqliteDatabase, FakeProcessor, RecordingDispatcher>;

pub fn verifier() -> WebhookVerifier {
    WebhookVerifier::new(Secret::new(WEBHOOK_SECRET.to_string()), 300)
}

/// Rates without any environment influence.
pub fn rates() -> RateResolver {
    RateResolver::new(StaticRateOverrides::default())
}

pub async fn add_partner(db: &SqliteDatabase) -> Owner {
    let owner = NewOwner::new(PUBLIC_KEY).with_callback_url(CALLBACK_URL).with_redirect_url(REDIRECT_URL);
    db.insert_owner(owner).await.expect("Error inserting owner")
}

pub fn webhook_processor(db: &SqliteDatabase, processor: &FakeProcessor, dispatcher: &RecordingDispatcher) -> TestProcessor {
    WebhookEventProcessor::new(db.clone(), processor.clone(), dispatcher.clone(), verifier(), rates())
}

/// A processor event body in the processor's wire format.
pub fn event_body(event_id: &str, event_type: &str, intent_id: &str, status: &str, amount: i64, currency: &str, metadata: &[(&str, &str)]) -> Vec<u8> {
    let metadata = metadata.iter().map(|(k, v)| (k.to_string(), serde_json::Value::from(*v))).collect::<serde_json::Map<_, _>>();
    let body = serde_json::json!({
        "id": event_id,
        "object": "event",
        "type": event_type,
        "data": {
            "object": {
                "id": intent_id,
                "object": "payment_intent",
                "status": status,
                "amount": amount,
                "currency": currency,
                "metadata": metadata,
            }
        }
    });
    serde_json::to_vec(&body).expect("Error serializing event")
}

pub fn sign(body: &[u8]) -> String {
    verifier().sign(body, Utc::now().timestamp()).expect("Error signing body")
}
