//! The checkout side of a payment: opening an intent for a partner's order, recording the method the payer picked,
//! and sending the payer back to the partner once the processor reports success.
use std::fmt::Debug;

use log::*;
use pbg_common::{MinorUnits, DEFAULT_CURRENCY_CODE};
use serde::{Deserialize, Serialize};

use crate::{
    api::{errors::PaymentFlowError, exchange_rate_api::RateResolver},
    db_types::{IntentId, NewPayment, Payment, PaymentMetadata, META_PAYMENT_TYPE},
    helpers::append_query,
    processor::PaymentProcessor,
    traits::PaymentGatewayDatabase,
};

/// The only `redirect_status` for which the payer is sent on to the partner.
pub const REDIRECT_SUCCEEDED: &str = "succeeded";

/// The parameters a partner passes when sending a payer to checkout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub public_key: Option<String>,
    pub account: Option<String>,
    /// The amount in major units, as a decimal string.
    pub sum: Option<String>,
    pub currency: Option<String>,
    pub desc: Option<String>,
    pub ordernum: Option<String>,
    pub project: Option<String>,
}

impl CheckoutRequest {
    fn amount(&self) -> Result<MinorUnits, PaymentFlowError> {
        let sum = self.sum.as_deref().map(str::trim).filter(|s| !s.is_empty()).unwrap_or("0");
        let amount = sum.parse::<MinorUnits>().map_err(|e| PaymentFlowError::InvalidAmount(e.to_string()))?;
        if amount < MinorUnits::from(0) {
            return Err(PaymentFlowError::InvalidAmount(format!("{sum} is negative")));
        }
        Ok(amount)
    }

    fn currency(&self) -> String {
        self.currency
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_CURRENCY_CODE)
            .to_uppercase()
    }

    fn metadata(&self, public_key: &str) -> PaymentMetadata {
        let field = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        PaymentMetadata {
            public_key: Some(public_key.to_string()),
            account: field(&self.account),
            ordernum: field(&self.ordernum),
            description: field(&self.desc),
            project: field(&self.project),
            sum: field(&self.sum),
            payment_type: None,
        }
    }
}

/// What the checkout page needs to collect the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub payment_id: i64,
    pub intent_id: IntentId,
    pub client_secret: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
}

pub struct PaymentFlowApi<B, P> {
    db: B,
    processor: P,
    rates: RateResolver,
}

impl<B, P> Debug for PaymentFlowApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B, P> PaymentFlowApi<B, P>
where
    B: PaymentGatewayDatabase,
    P: PaymentProcessor,
{
    pub fn new(db: B, processor: P, rates: RateResolver) -> Self {
        Self { db, processor, rates }
    }

    /// Creates an intent at the processor for a partner's order and records it as a pending payment.
    ///
    /// The owner must be known and must have both a callback and a redirect URL, otherwise nobody could be told about
    /// the outcome.
    pub async fn open_payment(&self, request: CheckoutRequest) -> Result<CheckoutSession, PaymentFlowError> {
        let public_key = request
            .public_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(PaymentFlowError::MissingPublicKey)?;
        let owner = self.db.fetch_owner_by_public_key(public_key).await?.ok_or(PaymentFlowError::UnknownOwner)?;
        if !owner.can_accept_payments() {
            warn!("💳️ Owner #{} tried to start a checkout without partner URLs configured", owner.id);
            return Err(PaymentFlowError::PartnerUrlsNotConfigured);
        }
        let amount = request.amount()?;
        let currency = request.currency();
        let metadata = request.metadata(public_key);
        let intent = self.processor.create_intent(amount, &currency, metadata.to_map()).await?;
        let payment = NewPayment::new(intent.id.clone(), owner.id, amount, &currency).with_metadata(metadata);
        let payment = self.db.insert_payment(payment).await?;
        info!("💳️ Payment #{} opened for owner #{} with intent {} ({amount} {currency})", payment.id, owner.id, intent.id);
        Ok(CheckoutSession {
            payment_id: payment.id,
            intent_id: intent.id,
            client_secret: intent.client_secret,
            amount,
            currency: payment.currency,
        })
    }

    /// Records the payment-method subtype the payer picked, both on the intent metadata and on the local record.
    ///
    /// A missing local record is not an error, since the webhook may create it later from the intent metadata.
    pub async fn set_payment_method(&self, intent_id: &IntentId, payment_type: &str) -> Result<(), PaymentFlowError> {
        let payment_type = payment_type.trim();
        if payment_type.is_empty() {
            return Err(PaymentFlowError::MissingPaymentType);
        }
        if !intent_id.is_well_formed() {
            return Err(PaymentFlowError::InvalidIntent(intent_id.to_string()));
        }
        let intent = self.processor.get_intent(intent_id).await?;
        let mut metadata = intent.metadata;
        metadata.insert(META_PAYMENT_TYPE.to_string(), payment_type.to_string());
        self.processor.update_intent_metadata(intent_id, metadata).await?;
        match self.db.update_payment_type(intent_id, payment_type).await? {
            Some(payment) => debug!("💳️ Payment #{} will be paid with {payment_type}", payment.id),
            None => debug!("💳️ No local payment for intent {intent_id} yet. Payment type stored on the intent only."),
        }
        Ok(())
    }

    /// Builds the partner URL the payer is redirected to after a successful payment.
    pub async fn success_redirect(
        &self,
        intent_id: Option<&str>,
        redirect_status: Option<&str>,
    ) -> Result<String, PaymentFlowError> {
        let intent_id = intent_id.map(str::trim).filter(|s| !s.is_empty()).ok_or(PaymentFlowError::MissingIntent)?;
        if redirect_status != Some(REDIRECT_SUCCEEDED) {
            let status = redirect_status.filter(|s| !s.trim().is_empty()).unwrap_or("unknown");
            return Err(PaymentFlowError::NotSucceeded(status.to_string()));
        }
        let payment = self.db.fetch_payment_by_intent(&IntentId::new(intent_id)).await?;
        let Some(payment) = payment else {
            warn!("💳️ Success redirect for intent {intent_id}, but there is no payment for it");
            return Err(PaymentFlowError::RedirectNotConfigured);
        };
        let owner = self.db.fetch_owner(payment.owner_id).await?;
        let target = owner.as_ref().and_then(|o| o.redirect_target()).ok_or(PaymentFlowError::RedirectNotConfigured)?;
        let params = redirect_params(&payment);
        Ok(append_query(target, params.iter().map(|(k, v)| (*k, v.as_str()))))
    }

    /// The EUR value of everything the owner has been paid.
    pub async fn balance_eur(&self, owner_id: i64) -> Result<f64, PaymentFlowError> {
        let payments = self.db.fetch_completed_payments_for_owner(owner_id).await?;
        let total = payments.iter().map(|p| p.amount.to_major() * self.rates.rate_to_eur(&p.currency)).sum::<f64>();
        Ok((total * 100.0).round() / 100.0)
    }
}

fn redirect_params(payment: &Payment) -> Vec<(&'static str, String)> {
    let mut params = Vec::with_capacity(5);
    if let Some(account) = &payment.pay_account {
        params.push(("account", account.clone()));
    }
    if let Some(sum) = &payment.sum {
        params.push(("sum", sum.clone()));
    }
    if let Some(ordernum) = &payment.ordernum {
        params.push(("ordernum", ordernum.clone()));
    }
    params.push(("amount", payment.amount.to_string()));
    params.push(("currency", payment.currency.clone()));
    params
}
