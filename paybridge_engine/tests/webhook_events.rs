mod support;

use paybridge_engine::{
    api::WebhookError,
    callbacks::CallbackMethod,
    db_types::{IntentId, NewPayment, Owner, PaymentMetadata, PaymentStatus},
    processor::{
        events::{INTENT_CANCELED, INTENT_FAILED, INTENT_SUCCEEDED},
        SignatureError,
        WebhookVerifier,
    },
    test_utils::{test_database, FakeProcessor, RecordingDispatcher},
    PaymentGatewayDatabase,
    SqliteDatabase,
    WebhookEventProcessor,
    WebhookOutcome,
};
use pbg_common::{MinorUnits, Secret};
use support::*;

async fn pending_payment(db: &SqliteDatabase, owner: &Owner, intent: &str) {
    let metadata = PaymentMetadata {
        public_key: Some(PUBLIC_KEY.into()),
        account: Some("acc1".into()),
        ordernum: Some("ord-1".into()),
        description: Some("".into()),
        sum: Some("12.50".into()),
        ..Default::default()
    };
    let payment = NewPayment::new(IntentId::new(intent), owner.id, MinorUnits::from(1250), "usd").with_metadata(metadata);
    db.insert_payment(payment).await.expect("Error inserting payment");
}

async fn status_of(db: &SqliteDatabase, intent: &str) -> Option<PaymentStatus> {
    db.fetch_payment_by_intent(&IntentId::new(intent)).await.unwrap().map(|p| p.status)
}

#[tokio::test]
async fn same_event_twice_applies_once() {
    let db = test_database().await;
    let owner = add_partner(&db).await;
    pending_payment(&db, &owner, "pi_1").await;
    let dispatcher = RecordingDispatcher::new();
    let api = webhook_processor(&db, &FakeProcessor::new(), &dispatcher);

    let body = event_body("evt_1", INTENT_SUCCEEDED, "pi_1", "succeeded", 1250, "usd", &[("account", "acc1")]);
    let first = api.handle(&body, Some(&sign(&body))).await.unwrap();
    assert!(matches!(first, WebhookOutcome::Applied { notified: true, .. }));
    let second = api.handle(&body, Some(&sign(&body))).await.unwrap();
    assert_eq!(second, WebhookOutcome::Duplicate);

    assert_eq!(status_of(&db, "pi_1").await, Some(PaymentStatus::Completed));
    assert_eq!(dispatcher.count(), 1);
    assert!(db.is_event_processed("evt_1").await.unwrap());
}

#[tokio::test]
async fn concurrent_deliveries_of_one_event_apply_once() {
    let db = test_database().await;
    let owner = add_partner(&db).await;
    pending_payment(&db, &owner, "pi_1").await;
    let dispatcher = RecordingDispatcher::new();
    let api_a = webhook_processor(&db, &FakeProcessor::new(), &dispatcher);
    let api_b = webhook_processor(&db, &FakeProcessor::new(), &dispatcher);

    let body = event_body("evt_race", INTENT_SUCCEEDED, "pi_1", "succeeded", 1250, "usd", &[]);
    let signature = sign(&body);
    let (a, b) = tokio::join!(api_a.handle(&body, Some(&signature)), api_b.handle(&body, Some(&signature)));
    let outcomes = [a.unwrap(), b.unwrap()];
    let applied = outcomes.iter().filter(|o| matches!(o, WebhookOutcome::Applied { .. })).count();
    assert_eq!(applied, 1, "{outcomes:?}");
    assert!(outcomes.contains(&WebhookOutcome::Duplicate));
    assert_eq!(dispatcher.count(), 1);
}

#[tokio::test]
async fn success_sends_pay_callback_with_filtered_params() {
    let db = test_database().await;
    let owner = add_partner(&db).await;
    pending_payment(&db, &owner, "pi_1").await;
    let dispatcher = RecordingDispatcher::new();
    let api = webhook_processor(&db, &FakeProcessor::new(), &dispatcher);

    let body = event_body("evt_1", INTENT_SUCCEEDED, "pi_1", "succeeded", 1250, "usd", &[("desc", "")]);
    api.handle(&body, Some(&sign(&body))).await.unwrap();

    let jobs = dispatcher.jobs();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.method, CallbackMethod::Pay);
    assert_eq!(job.callback_url, CALLBACK_URL);
    let param = |k: &str| job.params.get(k).map(String::as_str);
    assert_eq!(param("method"), Some("pay"));
    assert_eq!(param("params[account]"), Some("acc1"));
    assert_eq!(param("params[sum]"), Some("12.50"));
    assert_eq!(param("params[amount]"), Some("12.50"));
    assert_eq!(param("params[currency]"), Some("USD"));
    assert_eq!(param("params[revenue]"), Some("11.50"));
    assert_eq!(param("params[ordernum]"), None);
    assert_eq!(param("params[desc]"), None);
    assert_eq!(param("params[paymentType]"), None);
    let payment = db.fetch_payment_by_intent(&IntentId::new("pi_1")).await.unwrap().unwrap();
    assert_eq!(param("params[localpayId]"), Some(payment.id.to_string().as_str()));
}

#[tokio::test]
async fn failure_sends_error_callback() {
    let db = test_database().await;
    let owner = add_partner(&db).await;
    pending_payment(&db, &owner, "pi_1").await;
    let dispatcher = RecordingDispatcher::new();
    let api = webhook_processor(&db, &FakeProcessor::new(), &dispatcher);

    let body = event_body("evt_f", INTENT_FAILED, "pi_1", "requires_payment_method", 1250, "usd", &[]);
    api.handle(&body, Some(&sign(&body))).await.unwrap();
    assert_eq!(status_of(&db, "pi_1").await, Some(PaymentStatus::Failed));
    let jobs = dispatcher.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].method, CallbackMethod::Error);
}

#[tokio::test]
async fn terminal_payments_never_change() {
    let db = test_database().await;
    let owner = add_partner(&db).await;
    pending_payment(&db, &owner, "pi_1").await;
    let dispatcher = RecordingDispatcher::new();
    let api = webhook_processor(&db, &FakeProcessor::new(), &dispatcher);

    let succeeded = event_body("evt_1", INTENT_SUCCEEDED, "pi_1", "succeeded", 1250, "usd", &[]);
    api.handle(&succeeded, Some(&sign(&succeeded))).await.unwrap();
    let failed = event_body("evt_2", INTENT_FAILED, "pi_1", "requires_payment_method", 1250, "usd", &[]);
    assert_eq!(api.handle(&failed, Some(&sign(&failed))).await.unwrap(), WebhookOutcome::Unchanged);
    let canceled = event_body("evt_3", INTENT_CANCELED, "pi_1", "canceled", 1250, "usd", &[]);
    assert_eq!(api.handle(&canceled, Some(&sign(&canceled))).await.unwrap(), WebhookOutcome::Unchanged);

    assert_eq!(status_of(&db, "pi_1").await, Some(PaymentStatus::Completed));
    assert_eq!(dispatcher.count(), 1);
}

#[tokio::test]
async fn cancellation_only_applies_to_pending_payments() {
    let db = test_database().await;
    let owner = add_partner(&db).await;
    pending_payment(&db, &owner, "pi_1").await;
    let dispatcher = RecordingDispatcher::new();
    let api = webhook_processor(&db, &FakeProcessor::new(), &dispatcher);

    let canceled = event_body("evt_c", INTENT_CANCELED, "pi_1", "canceled", 1250, "usd", &[]);
    let outcome = api.handle(&canceled, Some(&sign(&canceled))).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::Applied { notified: false, .. }));
    assert_eq!(status_of(&db, "pi_1").await, Some(PaymentStatus::Canceled));
    assert_eq!(dispatcher.count(), 0);

    let unknown = event_body("evt_c2", INTENT_CANCELED, "pi_unknown", "canceled", 1250, "usd", &[]);
    assert_eq!(api.handle(&unknown, Some(&sign(&unknown))).await.unwrap(), WebhookOutcome::Unchanged);
    assert_eq!(status_of(&db, "pi_unknown").await, None);
}

#[tokio::test]
async fn first_event_creates_the_payment() {
    let db = test_database().await;
    let owner = add_partner(&db).await;
    let dispatcher = RecordingDispatcher::new();
    let api = webhook_processor(&db, &FakeProcessor::new(), &dispatcher);

    let metadata = [("public_key", PUBLIC_KEY), ("account", "acc9"), ("ordernum", "ord-9"), ("desc", "Gold plan")];
    let body = event_body("evt_new", INTENT_SUCCEEDED, "pi_new", "succeeded", 20_000, "uah", &metadata);
    api.handle(&body, Some(&sign(&body))).await.unwrap();

    let payment = db.fetch_payment_by_intent(&IntentId::new("pi_new")).await.unwrap().expect("payment was created");
    assert_eq!(payment.owner_id, owner.id);
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.amount, MinorUnits::from(20_000));
    assert_eq!(payment.currency, "UAH");
    assert_eq!(payment.pay_account.as_deref(), Some("acc9"));
    assert_eq!(payment.description.as_deref(), Some("Gold plan"));
    let jobs = dispatcher.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].params.get("params[revenue]").map(String::as_str), Some("4.20"));
}

#[tokio::test]
async fn events_without_an_owner_are_dead_lettered() {
    let db = test_database().await;
    add_partner(&db).await;
    let dispatcher = RecordingDispatcher::new();
    let api = webhook_processor(&db, &FakeProcessor::new(), &dispatcher);

    let orphan = event_body("evt_orphan", INTENT_SUCCEEDED, "pi_orphan", "succeeded", 500, "eur", &[("account", "x")]);
    assert_eq!(api.handle(&orphan, Some(&sign(&orphan))).await.unwrap(), WebhookOutcome::DeadLettered);
    assert_eq!(api.handle(&orphan, Some(&sign(&orphan))).await.unwrap(), WebhookOutcome::DeadLettered);
    let stranger = event_body("evt_stranger", INTENT_FAILED, "pi_s", "canceled", 500, "eur", &[("public_key", "pk_nobody")]);
    assert_eq!(api.handle(&stranger, Some(&sign(&stranger))).await.unwrap(), WebhookOutcome::DeadLettered);

    assert_eq!(status_of(&db, "pi_orphan").await, None);
    assert!(!db.is_event_processed("evt_orphan").await.unwrap());
    let letters = db.fetch_dead_letters().await.unwrap();
    assert_eq!(letters.len(), 2);
    let orphan_letter = letters.iter().find(|l| l.event_id == "evt_orphan").expect("orphan was parked");
    assert_eq!(orphan_letter.event_type, INTENT_SUCCEEDED);
    assert_eq!(orphan_letter.intent_id, Some(IntentId::new("pi_orphan")));
    assert_eq!(orphan_letter.payload.as_bytes(), orphan.as_slice());
    assert_eq!(dispatcher.count(), 0);
}

#[tokio::test]
async fn generic_wallet_type_is_refined() {
    let db = test_database().await;
    let owner = add_partner(&db).await;
    pending_payment(&db, &owner, "pi_w1").await;
    pending_payment(&db, &owner, "pi_w2").await;
    let processor = FakeProcessor::new();
    processor.set_wallet(&IntentId::new("pi_w1"), "googlepay");
    let dispatcher = RecordingDispatcher::new();
    let api = webhook_processor(&db, &processor, &dispatcher);

    let body = event_body("evt_w1", INTENT_SUCCEEDED, "pi_w1", "succeeded", 1250, "usd", &[("paymentType", "wallet")]);
    api.handle(&body, Some(&sign(&body))).await.unwrap();
    let body = event_body("evt_w2", INTENT_SUCCEEDED, "pi_w2", "succeeded", 1250, "usd", &[("paymentType", "wallet")]);
    api.handle(&body, Some(&sign(&body))).await.unwrap();

    let w1 = db.fetch_payment_by_intent(&IntentId::new("pi_w1")).await.unwrap().unwrap();
    assert_eq!(w1.payment_type.as_deref(), Some("googlepay"));
    let w2 = db.fetch_payment_by_intent(&IntentId::new("pi_w2")).await.unwrap().unwrap();
    assert_eq!(w2.payment_type.as_deref(), Some("wallet"));
    let jobs = dispatcher.jobs();
    assert_eq!(jobs[0].params.get("params[paymentType]").map(String::as_str), Some("googlepay"));
}

#[tokio::test]
async fn rejected_requests_leave_no_trace() {
    let db = test_database().await;
    let owner = add_partner(&db).await;
    pending_payment(&db, &owner, "pi_1").await;
    let dispatcher = RecordingDispatcher::new();
    let api = webhook_processor(&db, &FakeProcessor::new(), &dispatcher);
    let body = event_body("evt_1", INTENT_SUCCEEDED, "pi_1", "succeeded", 1250, "usd", &[]);

    let other_secret = WebhookVerifier::new(Secret::new("whsec_other".to_string()), 300);
    let forged = other_secret.sign(&body, chrono::Utc::now().timestamp()).unwrap();
    let err = api.handle(&body, Some(&forged)).await.unwrap_err();
    assert!(matches!(err, WebhookError::Signature(SignatureError::Mismatch)));
    assert!(err.is_bad_request());
    let err = api.handle(&body, None).await.unwrap_err();
    assert!(matches!(err, WebhookError::Signature(SignatureError::MissingHeader)));
    let err = api.handle(&[], Some(&sign(&body))).await.unwrap_err();
    assert!(matches!(err, WebhookError::MissingBody));

    assert!(!db.is_event_processed("evt_1").await.unwrap());
    assert_eq!(status_of(&db, "pi_1").await, Some(PaymentStatus::Pending));

    // A corrected redelivery is a fresh attempt
    let outcome = api.handle(&body, Some(&sign(&body))).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::Applied { .. }));
}

#[tokio::test]
async fn missing_secret_rejects_everything() {
    let db = test_database().await;
    let dispatcher = RecordingDispatcher::new();
    let unconfigured = WebhookVerifier::new(Secret::default(), 300);
    let api = WebhookEventProcessor::new(db, FakeProcessor::new(), dispatcher, unconfigured, rates());
    let body = event_body("evt_1", INTENT_SUCCEEDED, "pi_1", "succeeded", 1250, "usd", &[]);
    let err = api.handle(&body, Some(&sign(&body))).await.unwrap_err();
    assert!(matches!(err, WebhookError::SecretNotConfigured));
}

#[tokio::test]
async fn unknown_event_types_are_acknowledged() {
    let db = test_database().await;
    let dispatcher = RecordingDispatcher::new();
    let api = webhook_processor(&db, &FakeProcessor::new(), &dispatcher);
    let body = br#"{"id":"evt_x","object":"event","type":"charge.dispute.created","data":{"object":{"id":"dp_1"}}}"#;
    let outcome = api.handle(body, Some(&sign(body))).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Ignored("charge.dispute.created".into()));
    assert!(!db.is_event_processed("evt_x").await.unwrap());
}
