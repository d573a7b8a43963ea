use std::net::{IpAddr, SocketAddr};

use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use paybridge_engine::{
    db_types::{IntentId, PaymentStatus},
    processor::{events::INTENT_SUCCEEDED, WebhookVerifier},
    test_utils::RecordingDispatcher,
    PaymentGatewayDatabase,
    SqliteDatabase,
    WebhookEventProcessor,
};
use pbg_common::Secret;

use super::{
    helpers::{call, partner_db, pending_payment, rates, sign, verifier, PUBLIC_KEY},
    mocks::MockProcessor,
};
use crate::{config::WebhookAccess, routes::SIGNATURE_HEADER, server::stripe_scope};

const ACK: &str = r#"{"received":true}"#;

fn success_event(event_id: &str, intent_id: &str) -> Vec<u8> {
    let body = serde_json::json!({
        "id": event_id,
        "object": "event",
        "type": INTENT_SUCCEEDED,
        "data": { "object": {
            "id": intent_id,
            "object": "payment_intent",
            "status": "succeeded",
            "amount": 1999,
            "currency": "usd",
            "metadata": { "public_key": PUBLIC_KEY, "account": "user-17", "paymentType": "card" }
        }}
    });
    serde_json::to_vec(&body).unwrap()
}

fn configure(
    db: &SqliteDatabase,
    dispatcher: &RecordingDispatcher,
    verifier: WebhookVerifier,
    access: WebhookAccess,
) -> impl FnOnce(&mut ServiceConfig) {
    let api = WebhookEventProcessor::new(db.clone(), MockProcessor::new(), dispatcher.clone(), verifier, rates());
    move |cfg| {
        cfg.app_data(web::Data::new(api))
            .service(stripe_scope::<SqliteDatabase, MockProcessor, RecordingDispatcher>(access));
    }
}

fn delivery(body: &[u8], signature: Option<&str>) -> TestRequest {
    let mut req = TestRequest::post().uri("/stripe/webhook").set_payload(body.to_vec());
    if let Some(signature) = signature {
        req = req.insert_header((SIGNATURE_HEADER, signature.to_string()));
    }
    req
}

async fn status_of(db: &SqliteDatabase, intent: &str) -> PaymentStatus {
    db.fetch_payment_by_intent(&IntentId::new(intent)).await.unwrap().expect("payment exists").status
}

#[actix_web::test]
async fn signed_success_is_applied_once() {
    let (db, owner) = partner_db().await;
    pending_payment(&db, &owner, "pi_1").await;
    let dispatcher = RecordingDispatcher::new();
    let body = success_event("evt_1", "pi_1");
    let signature = sign(&body);

    for _ in 0..2 {
        let access = WebhookAccess::default();
        let res = call(delivery(&body, Some(&signature)), configure(&db, &dispatcher, verifier(), access)).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body, ACK);
    }
    assert_eq!(status_of(&db, "pi_1").await, PaymentStatus::Completed);
    assert_eq!(dispatcher.count(), 1);
}

#[actix_web::test]
async fn forged_signature_is_a_plain_text_bad_request() {
    let (db, owner) = partner_db().await;
    pending_payment(&db, &owner, "pi_1").await;
    let dispatcher = RecordingDispatcher::new();
    let body = success_event("evt_1", "pi_1");

    let req = delivery(&body, Some("t=1700000000,v1=deadbeef"));
    let res = call(req, configure(&db, &dispatcher, verifier(), WebhookAccess::default())).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.content_type.unwrap().starts_with("text/plain"));
    assert!(res.body.starts_with("Webhook Error:"), "{}", res.body);

    let res = call(delivery(&body, None), configure(&db, &dispatcher, verifier(), WebhookAccess::default())).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = call(delivery(b"", Some(&sign(b""))), configure(&db, &dispatcher, verifier(), WebhookAccess::default()))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, "Webhook Error: Missing raw body");

    assert_eq!(status_of(&db, "pi_1").await, PaymentStatus::Pending);
    assert_eq!(dispatcher.count(), 0);
}

#[actix_web::test]
async fn webhooks_are_refused_without_a_signing_secret() {
    let (db, _) = partner_db().await;
    let dispatcher = RecordingDispatcher::new();
    let body = success_event("evt_1", "pi_1");
    let unconfigured = WebhookVerifier::new(Secret::default(), 300);

    let res = call(delivery(&body, Some(&sign(&body))), configure(&db, &dispatcher, unconfigured, Default::default())).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, "Webhook secret not configured");
}

#[actix_web::test]
async fn unknown_event_types_are_acknowledged() {
    let (db, _) = partner_db().await;
    let dispatcher = RecordingDispatcher::new();
    let body = serde_json::to_vec(&serde_json::json!({
        "id": "evt_9",
        "object": "event",
        "type": "charge.refunded",
        "data": { "object": { "id": "ch_1", "object": "charge" } }
    }))
    .unwrap();

    let res = call(delivery(&body, Some(&sign(&body))), configure(&db, &dispatcher, verifier(), Default::default())).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, ACK);
}

#[actix_web::test]
async fn whitelist_guards_the_webhook_scope() {
    let (db, owner) = partner_db().await;
    pending_payment(&db, &owner, "pi_1").await;
    let dispatcher = RecordingDispatcher::new();
    let body = success_event("evt_1", "pi_1");
    let signature = sign(&body);
    let allowed: IpAddr = "203.0.113.7".parse().unwrap();
    let access = WebhookAccess { whitelist: Some(vec![allowed]), ..Default::default() };

    let stranger = SocketAddr::new("198.51.100.1".parse().unwrap(), 40000);
    let req = delivery(&body, Some(&signature)).peer_addr(stranger);
    let res = call(req, configure(&db, &dispatcher, verifier(), access.clone())).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(status_of(&db, "pi_1").await, PaymentStatus::Pending);

    let req = delivery(&body, Some(&signature)).peer_addr(SocketAddr::new(allowed, 40000));
    let res = call(req, configure(&db, &dispatcher, verifier(), access)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(status_of(&db, "pi_1").await, PaymentStatus::Completed);
}
