use std::time::Duration;

use actix_web::{
    dev::{HttpServiceFactory, Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
    Scope,
};
use futures::future::{ok, Either};
use log::*;
use paybridge_engine::{
    api::EnvRateOverrides,
    CallbackDispatch,
    CallbackDispatcher,
    CallbackWorker,
    HttpCallbackTransport,
    PaymentFlowApi,
    PaymentGatewayDatabase,
    PaymentProcessor,
    RateResolver,
    ReconciliationSweep,
    SqliteDatabase,
    StripeClient,
    WebhookEventProcessor,
};

use crate::{
    config::{ServerConfig, WebhookAccess},
    data_objects::CheckoutKeys,
    errors::ServerError,
    helpers::{get_remote_ip, is_whitelisted},
    routes::{health, OpenPaymentRoute, PaymentSuccessRoute, SetPaymentMethodRoute, StripeWebhookRoute},
    workers::{start_periodic_worker, CallbackDeliveryJob, SweepJob},
};

const MAX_DB_CONNECTIONS: u32 = 25;
const MAX_QUEUE_CONNECTIONS: u32 = 5;
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(15);

pub type Dispatcher = CallbackDispatcher<SqliteDatabase, HttpCallbackTransport>;

/// Everything the request handlers share. Built once and cloned into every actix worker.
#[derive(Clone)]
pub struct ServerContext {
    pub db: SqliteDatabase,
    pub processor: StripeClient,
    pub dispatcher: Dispatcher,
    pub rates: RateResolver,
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = open_database(&config.database_url, MAX_DB_CONNECTIONS).await?;
    let queue = match &config.queue_database_url {
        Some(url) => open_database(url, MAX_QUEUE_CONNECTIONS).await?,
        None => db.clone(),
    };
    let processor =
        StripeClient::new(config.stripe.stripe_config()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let transport =
        HttpCallbackTransport::new(Some(CALLBACK_TIMEOUT)).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let dispatcher = CallbackDispatcher::new(queue.clone(), transport.clone(), config.callbacks.retry_policy());
    let rates = RateResolver::new(EnvRateOverrides::default());

    let sweep = ReconciliationSweep::new(
        db.clone(),
        processor.clone(),
        db.clone(),
        dispatcher.clone(),
        rates.clone(),
        config.sweep.sweep_config(),
    );
    info!("🕰️ Reconciliation sweeps will run as {}", sweep.holder());
    let _sweeper = start_periodic_worker(SweepJob::new(sweep), config.sweep.interval);
    let worker = CallbackWorker::new(queue, transport, config.callbacks.worker_config());
    let _callbacks = start_periodic_worker(CallbackDeliveryJob::new(worker), config.callbacks.poll_interval);

    let context = ServerContext { db, processor, dispatcher, rates };
    let srv = create_server_instance(config, context)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

async fn open_database(url: &str, max_connections: u32) -> Result<SqliteDatabase, ServerError> {
    let db = SqliteDatabase::new_with_url(url, max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(format!("Could not open {url}. {e}")))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Could not migrate {url}. {e}")))?;
    Ok(db)
}

pub fn create_server_instance(config: ServerConfig, context: ServerContext) -> Result<Server, ServerError> {
    let verifier = config.stripe.webhook_verifier();
    let access = WebhookAccess::from_config(&config);
    let keys = CheckoutKeys { publishable_key: config.stripe.publishable_key.clone() };
    let srv = HttpServer::new(move || {
        let ServerContext { db, processor, dispatcher, rates } = context.clone();
        let webhook_api =
            WebhookEventProcessor::new(db.clone(), processor.clone(), dispatcher, verifier.clone(), rates.clone());
        let payment_api = PaymentFlowApi::new(db, processor, rates);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("pbg::access_log"))
            .app_data(web::Data::new(webhook_api))
            .app_data(web::Data::new(payment_api))
            .app_data(web::Data::new(keys.clone()))
            .service(health)
            .service(stripe_scope::<SqliteDatabase, StripeClient, Dispatcher>(access.clone()))
            .service(pay_scope::<SqliteDatabase, StripeClient>())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// The processor-facing routes. If a whitelist is configured, requests from any other address are refused before
/// the body is read.
pub fn stripe_scope<B, P, D>(access: WebhookAccess) -> impl HttpServiceFactory
where
    B: PaymentGatewayDatabase + 'static,
    P: PaymentProcessor + 'static,
    D: CallbackDispatch + 'static,
{
    web::scope("/stripe")
        .wrap_fn(move |req, srv| {
            let peer_ip = get_remote_ip(req.request(), access.use_x_forwarded_for, access.use_forwarded);
            if is_whitelisted(peer_ip, access.whitelist.as_deref()) {
                Either::Left(srv.call(req))
            } else {
                Either::Right(ok::<_, actix_web::Error>(req.error_response(ServerError::ForbiddenPeer)))
            }
        })
        .service(StripeWebhookRoute::<B, P, D>::new())
}

/// The routes used by the checkout page.
pub fn pay_scope<B, P>() -> Scope
where
    B: PaymentGatewayDatabase + 'static,
    P: PaymentProcessor + 'static,
{
    web::scope("/pay")
        .service(OpenPaymentRoute::<B, P>::new())
        .service(SetPaymentMethodRoute::<B, P>::new())
        .service(PaymentSuccessRoute::<B, P>::new())
}
