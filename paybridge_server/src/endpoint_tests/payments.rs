use std::collections::HashMap;

use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use paybridge_engine::{
    db_types::{IntentId, PaymentStatus},
    PaymentFlowApi,
    PaymentGatewayDatabase,
    SqliteDatabase,
};
use pbg_common::MinorUnits;
use serde_json::{json, Value};

use super::{
    helpers::{call, partner_db, pending_payment, rates, PUBLIC_KEY, PUBLISHABLE_KEY},
    mocks::{new_intent, MockProcessor},
};
use crate::{data_objects::CheckoutKeys, server::pay_scope};

fn configure(db: &SqliteDatabase, processor: MockProcessor) -> impl FnOnce(&mut ServiceConfig) {
    let api = PaymentFlowApi::new(db.clone(), processor, rates());
    move |cfg| {
        cfg.app_data(web::Data::new(api))
            .app_data(web::Data::new(CheckoutKeys { publishable_key: PUBLISHABLE_KEY.to_string() }))
            .service(pay_scope::<SqliteDatabase, MockProcessor>());
    }
}

#[actix_web::test]
async fn checkout_opens_an_intent() {
    let (db, owner) = partner_db().await;
    let mut processor = MockProcessor::new();
    processor
        .expect_create_intent()
        .times(1)
        .returning(|amount, currency, metadata| Ok(new_intent("pi_mock_1", amount, currency, metadata)));
    let req = TestRequest::post().uri("/pay/intent").set_json(json!({
        "public_key": PUBLIC_KEY,
        "account": "user-17",
        "sum": "12.50",
        "desc": "Gold membership",
        "ordernum": "A-1001"
    }));

    let res = call(req, configure(&db, processor)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let body: Value = serde_json::from_str(&res.body).unwrap();
    assert_eq!(body["paymentIntentId"], "pi_mock_1");
    assert_eq!(body["clientSecret"], "pi_mock_1_secret_abc");
    assert_eq!(body["amount"], "12.50");
    assert_eq!(body["currency"], "EUR");
    assert_eq!(body["publishableKey"], PUBLISHABLE_KEY);

    let payment = db.fetch_payment_by_intent(&IntentId::new("pi_mock_1")).await.unwrap().unwrap();
    assert_eq!(payment.owner_id, owner.id);
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, MinorUnits::from(1250));
    assert_eq!(payment.pay_account.as_deref(), Some("user-17"));
}

#[actix_web::test]
async fn checkout_rejects_unknown_partners() {
    let (db, _) = partner_db().await;
    let req = TestRequest::post().uri("/pay/intent").set_json(json!({ "public_key": "pk_nobody", "sum": "5" }));
    let res = call(req, configure(&db, MockProcessor::new())).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body, r#"{"error":"Invalid public_key"}"#);

    let req = TestRequest::post().uri("/pay/intent").set_json(json!({ "sum": "5" }));
    let res = call(req, configure(&db, MockProcessor::new())).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(db.fetch_pending_payments(10).await.unwrap().is_empty());
}

#[actix_web::test]
async fn chosen_method_is_recorded() {
    let (db, owner) = partner_db().await;
    pending_payment(&db, &owner, "pi_1").await;
    let mut processor = MockProcessor::new();
    processor.expect_get_intent().times(1).returning(|id| {
        let metadata = HashMap::from([("account".to_string(), "user-17".to_string())]);
        Ok(new_intent(id.as_str(), MinorUnits::from(1999), "usd", metadata))
    });
    processor.expect_update_intent_metadata().times(1).returning(|id, metadata| {
        assert_eq!(metadata.get("paymentType").map(String::as_str), Some("wallet"));
        assert_eq!(metadata.get("account").map(String::as_str), Some("user-17"));
        Ok(new_intent(id.as_str(), MinorUnits::from(1999), "usd", metadata))
    });
    let req = TestRequest::post()
        .uri("/pay/set-method")
        .set_json(json!({ "paymentIntentId": "pi_1", "paymentType": "wallet" }));

    let res = call(req, configure(&db, processor)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body, r#"{"ok":true}"#);
    let payment = db.fetch_payment_by_intent(&IntentId::new("pi_1")).await.unwrap().unwrap();
    assert_eq!(payment.payment_type.as_deref(), Some("wallet"));
}

#[actix_web::test]
async fn set_method_needs_both_fields() {
    let (db, _) = partner_db().await;
    let req = TestRequest::post().uri("/pay/set-method").set_json(json!({ "paymentIntentId": "pi_1" }));
    let res = call(req, configure(&db, MockProcessor::new())).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let req = TestRequest::post().uri("/pay/set-method").set_json(json!({ "paymentIntentId": " ", "paymentType": "visa" }));
    let res = call(req, configure(&db, MockProcessor::new())).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn set_method_refuses_malformed_intent_ids() {
    let (db, owner) = partner_db().await;
    pending_payment(&db, &owner, "pi_1").await;
    // The mock has no expectations, so any processor call would fail the test
    for id in ["../charges/ch_x", "pi_1/cancel", "pi_1?expand[]=customer"] {
        let req = TestRequest::post().uri("/pay/set-method").set_json(json!({ "paymentIntentId": id, "paymentType": "visa" }));
        let res = call(req, configure(&db, MockProcessor::new())).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{id}: {}", res.body);
    }
    let payment = db.fetch_payment_by_intent(&IntentId::new("pi_1")).await.unwrap().unwrap();
    assert_eq!(payment.payment_type, None);
}

#[actix_web::test]
async fn successful_payers_are_sent_back_to_the_partner() {
    let (db, owner) = partner_db().await;
    pending_payment(&db, &owner, "pi_1").await;

    let req = TestRequest::get().uri("/pay/success?payment_intent=pi_1&redirect_status=succeeded");
    let res = call(req, configure(&db, MockProcessor::new())).await;
    assert_eq!(res.status, StatusCode::FOUND);
    assert_eq!(
        res.location.as_deref(),
        Some("https://shop.example/thanks?account=user-17&sum=19.99&ordernum=A-1001&amount=19.99&currency=USD")
    );

    let req = TestRequest::get().uri("/pay/success?payment_intent=pi_1&redirect_status=failed");
    let res = call(req, configure(&db, MockProcessor::new())).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, r#"{"error":"Payment not completed. Redirect status: failed"}"#);

    let req = TestRequest::get().uri("/pay/success?redirect_status=succeeded");
    let res = call(req, configure(&db, MockProcessor::new())).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.location.is_none());
}
