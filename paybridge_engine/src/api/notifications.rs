//! Steps shared by the webhook processor and the reconciliation sweep when a payment reaches a final outcome.
use log::*;

use crate::{
    api::exchange_rate_api::RateResolver,
    callbacks::{CallbackDispatch, CallbackJob, CallbackMethod, CallbackParams},
    db_types::{IntentId, Payment},
    processor::PaymentProcessor,
    traits::PaymentGatewayDatabase,
};

/// The payment type checkout sends for any wallet payment, before the brand is known.
pub const GENERIC_WALLET_TYPE: &str = "wallet";

/// Works out which payment-method subtype paid for an intent.
///
/// A declared type of `wallet` is refined into the wallet brand with a processor lookup. If the lookup comes back
/// empty, the declared type is kept.
pub async fn resolve_payment_type<P: PaymentProcessor>(
    processor: &P,
    intent_id: &IntentId,
    declared: Option<&str>,
) -> Option<String> {
    match declared {
        Some(GENERIC_WALLET_TYPE) => {
            let brand = processor.resolve_wallet_type(intent_id).await;
            trace!("Wallet brand for {intent_id}: {brand:?}");
            brand.or_else(|| Some(GENERIC_WALLET_TYPE.to_string()))
        },
        other => other.map(String::from),
    }
}

/// Sends the partner exactly one notification for `payment`. Returns `false` if the owner has no callback URL.
///
/// Once the job has been handed to the dispatcher (or there is nobody to notify), the payment's unreported flag is
/// cleared. If the owner cannot be loaded, the flag stays and the reconciliation sweep tries again later.
pub async fn notify_partner<B, D>(
    db: &B,
    dispatcher: &D,
    rates: &RateResolver,
    payment: &Payment,
    method: CallbackMethod,
) -> bool
where
    B: PaymentGatewayDatabase,
    D: CallbackDispatch,
{
    let owner = match db.fetch_owner(payment.owner_id).await {
        Ok(Some(owner)) => owner,
        Ok(None) => {
            error!("📮️ Payment #{} belongs to owner #{}, which does not exist", payment.id, payment.owner_id);
            return false;
        },
        Err(e) => {
            error!("📮️ Could not load owner #{} for payment #{}: {e}", payment.owner_id, payment.id);
            return false;
        },
    };
    let Some(url) = owner.callback_target() else {
        warn!("📮️ Owner #{} has no callback URL. Payment #{} will not be reported", owner.id, payment.id);
        mark_reported(db, payment.id).await;
        return false;
    };
    let rate = rates.rate_to_eur(&payment.currency);
    let job = CallbackJob::new(method, url, CallbackParams::for_payment(payment, rate));
    dispatcher.dispatch(job).await;
    mark_reported(db, payment.id).await;
    true
}

async fn mark_reported<B: PaymentGatewayDatabase>(db: &B, payment_id: i64) {
    if let Err(e) = db.mark_reported(payment_id).await {
        warn!("📮️ Could not clear the unreported flag of payment #{payment_id}: {e}. The sweep may notify it again.");
    }
}
