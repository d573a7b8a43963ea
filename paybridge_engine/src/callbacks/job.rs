use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use pbg_common::is_blank;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{ConversionError, Payment},
    helpers::append_query,
};

/// The `method` discriminator understood by the partner's callback endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackMethod {
    /// The payment completed
    Pay,
    /// The payment failed
    Error,
}

impl CallbackMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackMethod::Pay => "pay",
            CallbackMethod::Error => "error",
        }
    }
}

impl Display for CallbackMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallbackMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pay" => Ok(Self::Pay),
            "error" => Ok(Self::Error),
            _ => Err(ConversionError::from(format!("Invalid callback method: {s}"))),
        }
    }
}

/// A single partner notification. The parameter map is flat and already includes the `method` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackJob {
    pub method: CallbackMethod,
    pub callback_url: String,
    pub params: BTreeMap<String, String>,
}

impl CallbackJob {
    pub fn new(method: CallbackMethod, callback_url: &str, params: CallbackParams) -> Self {
        Self { method, callback_url: callback_url.trim().to_string(), params: params.into_map(method) }
    }

    /// The full URL the partner is called on.
    pub fn target_url(&self) -> String {
        append_query(&self.callback_url, self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

/// Builds the namespaced `params[...]` set. Values that are blank after trimming are left out.
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    params: BTreeMap<String, String>,
}

impl CallbackParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// The parameters for the outcome of `payment`. `rate_to_eur` converts the payment amount into EUR revenue.
    pub fn for_payment(payment: &Payment, rate_to_eur: f64) -> Self {
        let revenue = payment.amount.to_major() * rate_to_eur;
        Self::new()
            .with("account", payment.pay_account.as_deref())
            .with("project", payment.project.as_deref())
            .with("sum", payment.sum.as_deref())
            .with("amount", Some(payment.amount.to_string()))
            .with("currency", Some(payment.currency.as_str()))
            .with("localpayId", Some(payment.id.to_string()))
            .with("paymentType", payment.payment_type.as_deref())
            .with("revenue", Some(format!("{revenue:.2}")))
            .with("desc", payment.description.as_deref())
    }

    pub fn with<S: AsRef<str>>(mut self, key: &str, value: Option<S>) -> Self {
        if let Some(v) = value {
            let v = v.as_ref();
            if !is_blank(v) {
                self.params.insert(format!("params[{key}]"), v.trim().to_string());
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(&format!("params[{key}]")).map(String::as_str)
    }

    pub fn into_map(self, method: CallbackMethod) -> BTreeMap<String, String> {
        let mut map = self.params;
        map.insert("method".to_string(), method.to_string());
        map
    }
}
