use actix_web::{
    http::{
        header::{HeaderName, CONTENT_TYPE, LOCATION},
        StatusCode,
    },
    test,
    test::TestRequest,
    web::ServiceConfig,
    App,
};
use chrono::Utc;
use log::debug;
use paybridge_engine::{
    api::StaticRateOverrides,
    db_types::{IntentId, NewOwner, NewPayment, Owner, PaymentMetadata},
    processor::WebhookVerifier,
    test_utils::test_database,
    OwnerManagement,
    PaymentGatewayDatabase,
    RateResolver,
    SqliteDatabase,
};
use pbg_common::{MinorUnits, Secret};

pub const WEBHOOK_SECRET: &str = "whsec_endpoint_tests";
pub const PUBLIC_KEY: &str = "pk_shop_0042";
pub const PUBLISHABLE_KEY: &str = "pk_test_checkout";

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub location: Option<String>,
    pub body: String,
}

/// Sends `req` to an app built by `configure` and collects the response.
pub async fn call<F>(req: TestRequest, configure: F) -> TestResponse
where F: FnOnce(&mut ServiceConfig) {
    let app = test::init_service(App::new().configure(configure)).await;
    debug!("Making request");
    let res = test::call_service(&app, req.to_request()).await;
    let status = res.status();
    let header = |name: HeaderName| res.headers().get(name).and_then(|v| v.to_str().ok()).map(String::from);
    let content_type = header(CONTENT_TYPE);
    let location = header(LOCATION);
    let body = String::from_utf8_lossy(&test::read_body(res).await).into_owned();
    TestResponse { status, content_type, location, body }
}

pub fn verifier() -> WebhookVerifier {
    WebhookVerifier::new(Secret::new(WEBHOOK_SECRET.to_string()), 300)
}

pub fn sign(body: &[u8]) -> String {
    verifier().sign(body, Utc::now().timestamp()).expect("Error signing body")
}

pub fn rates() -> RateResolver {
    RateResolver::new(StaticRateOverrides::default())
}

/// A fresh database with one partner who can accept payments.
pub async fn partner_db() -> (SqliteDatabase, Owner) {
    let _ = env_logger::try_init().ok();
    let db = test_database().await;
    let owner = NewOwner::new(PUBLIC_KEY)
        .with_callback_url("https://shop.example/pbg/callback")
        .with_redirect_url("https://shop.example/thanks");
    let owner = db.insert_owner(owner).await.expect("Error inserting owner");
    (db, owner)
}

pub async fn pending_payment(db: &SqliteDatabase, owner: &Owner, intent: &str) {
    let metadata = PaymentMetadata {
        public_key: Some(PUBLIC_KEY.into()),
        account: Some("user-17".into()),
        ordernum: Some("A-1001".into()),
        sum: Some("19.99".into()),
        ..Default::default()
    };
    let payment = NewPayment::new(IntentId::new(intent), owner.id, MinorUnits::from(1999), "USD").with_metadata(metadata);
    db.insert_payment(payment).await.expect("Error inserting payment");
}
