//! Conversion of payment currencies into EUR, for revenue reporting.
//!
//! Rates are informational only. An unknown currency resolves to a rate of zero (no revenue credit) rather than an
//! error, so that a missing rate never blocks a payment or a partner notification.
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use log::*;
use pbg_common::DEFAULT_CURRENCY_CODE;

pub const RATE_OVERRIDE_PREFIX: &str = "PBG_CURRENCY_RATE_";

/// The built-in multipliers from one unit of currency to EUR. A static snapshot, not live FX.
pub const DEFAULT_RATES_TO_EUR: [(&str, f64); 4] = [("EUR", 1.0), ("USD", 0.92), ("UAH", 0.021), ("GBP", 1.17)];

/// A source of operator-supplied rates that take precedence over the built-in table.
pub trait RateOverrides: Send + Sync {
    /// The override for the (upper-case) currency `code`, if one is configured.
    fn rate_for(&self, code: &str) -> Option<f64>;
}

/// Reads overrides from `PBG_CURRENCY_RATE_<CODE>` environment variables at call time, so they can be changed without
/// a restart.
#[derive(Debug, Clone)]
pub struct EnvRateOverrides {
    prefix: String,
}

impl Default for EnvRateOverrides {
    fn default() -> Self {
        Self { prefix: RATE_OVERRIDE_PREFIX.to_string() }
    }
}

impl EnvRateOverrides {
    pub fn with_prefix<S: Into<String>>(prefix: S) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl RateOverrides for EnvRateOverrides {
    fn rate_for(&self, code: &str) -> Option<f64> {
        let key = format!("{}{code}", self.prefix);
        let value = std::env::var(&key).ok()?;
        parse_rate(&value).or_else(|| {
            warn!("Ignoring {key}: '{value}' is not a valid rate");
            None
        })
    }
}

/// A fixed set of overrides.
#[derive(Debug, Clone, Default)]
pub struct StaticRateOverrides {
    rates: HashMap<String, f64>,
}

impl StaticRateOverrides {
    pub fn with_rate(mut self, code: &str, rate: f64) -> Self {
        self.rates.insert(code.trim().to_uppercase(), rate);
        self
    }
}

impl RateOverrides for StaticRateOverrides {
    fn rate_for(&self, code: &str) -> Option<f64> {
        self.rates.get(code).copied()
    }
}

fn parse_rate(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok().filter(|r| r.is_finite())
}

/// Resolves the EUR multiplier for a currency: an override if one exists, then the built-in table, then zero.
#[derive(Clone)]
pub struct RateResolver {
    overrides: Arc<dyn RateOverrides>,
}

impl Debug for RateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RateResolver")
    }
}

impl Default for RateResolver {
    fn default() -> Self {
        Self::new(EnvRateOverrides::default())
    }
}

impl RateResolver {
    pub fn new<O: RateOverrides + 'static>(overrides: O) -> Self {
        Self { overrides: Arc::new(overrides) }
    }

    pub fn rate_to_eur(&self, currency: &str) -> f64 {
        let code = match currency.trim() {
            "" => DEFAULT_CURRENCY_CODE.to_string(),
            c => c.to_uppercase(),
        };
        if let Some(rate) = self.overrides.rate_for(&code) {
            trace!("Using override rate {rate} for {code}");
            return rate;
        }
        DEFAULT_RATES_TO_EUR.iter().find(|(c, _)| *c == code).map(|(_, r)| *r).unwrap_or_else(|| {
            debug!("No EUR rate is known for {code}. Using 0");
            0.0
        })
    }
}
