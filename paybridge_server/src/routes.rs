//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into the engine. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Any long, non-cpu-bound operation (database and processor calls in
//! particular) must be awaited, never blocked on.
use actix_web::{get, http::header::LOCATION, web, HttpRequest, HttpResponse, Responder};
use log::*;
use paybridge_engine::{
    db_types::IntentId,
    CallbackDispatch,
    CheckoutRequest,
    PaymentFlowApi,
    PaymentGatewayDatabase,
    PaymentProcessor,
    WebhookEventProcessor,
};

use crate::{
    data_objects::{CheckoutKeys, CheckoutResponse, OkResponse, SetMethodRequest, SuccessQuery},
    errors::ServerError,
};

/// The header carrying the processor's webhook signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro.
// `route!(name => Method "/path" impl TraitA, TraitB)` creates a `NameRoute<TTraitA, TTraitB>` service that registers
// `name::<TTraitA, TTraitB>` as the handler. The handler's type parameters must follow the order of the traits.
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Webhook  ----------------------------------------------------
route!(stripe_webhook => Post "/webhook" impl PaymentGatewayDatabase, PaymentProcessor, CallbackDispatch);
/// Route handler for processor webhooks.
///
/// The body is taken as raw bytes, because the signature covers the exact bytes the processor sent. Any 2xx tells the
/// processor to stop redelivering, so storage failures are answered with a 500 and everything that can never succeed
/// (bad signature, garbled body) with a plain-text 400.
pub async fn stripe_webhook<B, P, D>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<WebhookEventProcessor<B, P, D>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProcessor,
    D: CallbackDispatch,
{
    trace!("💻️ Received webhook delivery ({} bytes)", body.len());
    let signature = req.headers().get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let outcome = api.handle(&body, signature).await?;
    debug!("💻️ Webhook outcome: {outcome:?}");
    Ok(HttpResponse::Ok().json(outcome.ack()))
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(open_payment => Post "/intent" impl PaymentGatewayDatabase, PaymentProcessor);
/// Opens an intent for a partner's order and records the pending payment.
pub async fn open_payment<B, P>(
    body: web::Json<CheckoutRequest>,
    api: web::Data<PaymentFlowApi<B, P>>,
    keys: web::Data<CheckoutKeys>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProcessor,
{
    trace!("💻️ Received checkout request");
    let session = api.open_payment(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(CheckoutResponse::new(session, &keys.publishable_key)))
}

route!(set_payment_method => Post "/set-method" impl PaymentGatewayDatabase, PaymentProcessor);
pub async fn set_payment_method<B, P>(
    body: web::Json<SetMethodRequest>,
    api: web::Data<PaymentFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProcessor,
{
    let SetMethodRequest { payment_intent_id, payment_type } = body.into_inner();
    if payment_intent_id.trim().is_empty() {
        return Err(ServerError::BadRequest("paymentIntentId is required".into()));
    }
    trace!("💻️ Setting payment type {payment_type} for {payment_intent_id}");
    api.set_payment_method(&IntentId::new(payment_intent_id.trim()), &payment_type).await?;
    Ok(HttpResponse::Ok().json(OkResponse::default()))
}

route!(payment_success => Get "/success" impl PaymentGatewayDatabase, PaymentProcessor);
/// The processor's return URL. Sends the payer back to the partner.
pub async fn payment_success<B, P>(
    query: web::Query<SuccessQuery>,
    api: web::Data<PaymentFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProcessor,
{
    let SuccessQuery { payment_intent, redirect_status } = query.into_inner();
    let target = api.success_redirect(payment_intent.as_deref(), redirect_status.as_deref()).await?;
    debug!("💻️ Redirecting payer to {target}");
    Ok(HttpResponse::Found().insert_header((LOCATION, target)).finish())
}
