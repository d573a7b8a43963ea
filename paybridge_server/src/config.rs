//! Server configuration, read from `PBG_*` environment variables.
//!
//! Every setting has a default. Missing or unparseable values are logged and replaced by the default, so the server
//! always starts; it is up to the operator to read the 🪛️ log lines.
use std::{env, fmt::Display, net::IpAddr, str::FromStr, time::Duration};

use log::*;
use paybridge_engine::{
    api::{
        reconciliation_api::{DEFAULT_EXPIRY_MINUTES, DEFAULT_LOCK_LEASE, DEFAULT_SWEEP_BATCH_SIZE},
        SweepConfig,
    },
    callbacks::{
        RetentionPolicy,
        RetryPolicy,
        WorkerConfig,
        DEFAULT_BACKOFF_BASE,
        DEFAULT_BATCH_SIZE,
        DEFAULT_KEEP_COMPLETED,
        DEFAULT_KEEP_FAILED,
        DEFAULT_MAX_ATTEMPTS,
    },
    processor::{signature::DEFAULT_TOLERANCE_SECS, StripeConfig, WebhookVerifier, DEFAULT_STRIPE_API_URL},
};
use pbg_common::{parse_boolean_flag, Secret};

const DEFAULT_PBG_HOST: &str = "127.0.0.1";
const DEFAULT_PBG_PORT: u16 = 8370;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The callback queue may live in its own database. When `None`, the main database is used.
    pub queue_database_url: Option<String>,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// If supplied, requests against /stripe endpoints will be checked against this list of IP addresses.
    /// To explicitly disable the whitelist, set this to "false", "none", or "0".
    pub webhook_whitelist: Option<Vec<IpAddr>>,
    pub stripe: StripeSettings,
    pub sweep: SweepSettings,
    pub callbacks: CallbackSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PBG_HOST.to_string(),
            port: DEFAULT_PBG_PORT,
            database_url: String::default(),
            queue_database_url: None,
            use_x_forwarded_for: false,
            use_forwarded: false,
            webhook_whitelist: None,
            stripe: StripeSettings::default(),
            sweep: SweepSettings::default(),
            callbacks: CallbackSettings::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("PBG_HOST").ok().unwrap_or_else(|| DEFAULT_PBG_HOST.into());
        let port = env_or_default("PBG_PORT", DEFAULT_PBG_PORT);
        let database_url = env::var("PBG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ PBG_DATABASE_URL is not set. Please set it to the URL for the PayBridge database.");
            String::default()
        });
        let queue_database_url = env::var("PBG_QUEUE_DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
        if queue_database_url.is_none() {
            info!("🪛️ PBG_QUEUE_DATABASE_URL is not set. Callback jobs will be queued in the main database.");
        }
        let use_x_forwarded_for = parse_boolean_flag(env::var("PBG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("PBG_USE_FORWARDED").ok(), false);
        let webhook_whitelist = env::var("PBG_WEBHOOK_IP_WHITELIST").ok().and_then(|s| parse_whitelist(&s));
        log_whitelist(&webhook_whitelist);
        Self {
            host,
            port,
            database_url,
            queue_database_url,
            use_x_forwarded_for,
            use_forwarded,
            webhook_whitelist,
            stripe: StripeSettings::from_env_or_default(),
            sweep: SweepSettings::from_env_or_default(),
            callbacks: CallbackSettings::from_env_or_default(),
        }
    }

    /// The URL of the database holding the callback queue.
    pub fn queue_database_url(&self) -> &str {
        self.queue_database_url.as_deref().unwrap_or(&self.database_url)
    }
}

//-------------------------------------------------  StripeSettings  ---------------------------------------------------
#[derive(Clone, Debug)]
pub struct StripeSettings {
    pub api_url: String,
    pub secret_key: Secret<String>,
    /// Not a secret. The checkout page needs it to mount the payment form.
    pub publishable_key: String,
    pub webhook_secret: Secret<String>,
    pub webhook_tolerance_secs: i64,
}

impl Default for StripeSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_STRIPE_API_URL.to_string(),
            secret_key: Secret::default(),
            publishable_key: String::default(),
            webhook_secret: Secret::default(),
            webhook_tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }
}

impl StripeSettings {
    pub fn from_env_or_default() -> Self {
        let api_url = env::var("PBG_STRIPE_API_URL").ok().unwrap_or_else(|| DEFAULT_STRIPE_API_URL.into());
        let secret_key = Secret::new(env::var("PBG_STRIPE_SECRET_KEY").ok().unwrap_or_else(|| {
            error!("🪛️ PBG_STRIPE_SECRET_KEY is not set. Calls to the payment processor will fail.");
            String::default()
        }));
        let publishable_key = env::var("PBG_STRIPE_PUBLISHABLE_KEY").ok().unwrap_or_else(|| {
            warn!("🪛️ PBG_STRIPE_PUBLISHABLE_KEY is not set. The checkout page will not be able to collect payments.");
            String::default()
        });
        let webhook_secret = Secret::new(env::var("PBG_STRIPE_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ PBG_STRIPE_WEBHOOK_SECRET is not set. Every webhook delivery will be rejected.");
            String::default()
        }));
        let webhook_tolerance_secs = env_or_default("PBG_WEBHOOK_TOLERANCE_SECS", DEFAULT_TOLERANCE_SECS);
        Self { api_url, secret_key, publishable_key, webhook_secret, webhook_tolerance_secs }
    }

    pub fn stripe_config(&self) -> StripeConfig {
        StripeConfig { api_url: self.api_url.clone(), secret_key: self.secret_key.clone(), ..Default::default() }
    }

    pub fn webhook_verifier(&self) -> WebhookVerifier {
        WebhookVerifier::new(self.webhook_secret.clone(), self.webhook_tolerance_secs)
    }
}

//-------------------------------------------------  SweepSettings  ----------------------------------------------------
#[derive(Clone, Copy, Debug)]
pub struct SweepSettings {
    pub interval: Duration,
    pub expiry_minutes: i64,
    pub batch_size: u32,
    pub lock_lease: Duration,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            expiry_minutes: DEFAULT_EXPIRY_MINUTES,
            batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            lock_lease: DEFAULT_LOCK_LEASE,
        }
    }
}

impl SweepSettings {
    pub fn from_env_or_default() -> Self {
        let interval = Duration::from_secs(env_or_default("PBG_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL.as_secs()));
        let expiry_minutes = env_or_default("PBG_PENDING_EXPIRY_MINUTES", DEFAULT_EXPIRY_MINUTES);
        let batch_size = env_or_default("PBG_SWEEP_BATCH_SIZE", DEFAULT_SWEEP_BATCH_SIZE);
        let lock_lease = Duration::from_secs(env_or_default("PBG_SWEEP_LOCK_LEASE_SECS", DEFAULT_LOCK_LEASE.as_secs()));
        if lock_lease < Duration::from_secs(60) {
            warn!("🪛️ The sweep lock lease ({lock_lease:?}) is very short. Two sweeps may end up overlapping.");
        }
        Self { interval, expiry_minutes, batch_size, lock_lease }
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            batch_size: self.batch_size,
            expiry: chrono::Duration::minutes(self.expiry_minutes),
            lock_lease: self.lock_lease,
            ..SweepConfig::default()
        }
    }
}

//-------------------------------------------------  CallbackSettings  -------------------------------------------------
#[derive(Clone, Copy, Debug)]
pub struct CallbackSettings {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub keep_completed: u32,
    pub keep_failed: u32,
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            keep_completed: DEFAULT_KEEP_COMPLETED,
            keep_failed: DEFAULT_KEEP_FAILED,
        }
    }
}

impl CallbackSettings {
    pub fn from_env_or_default() -> Self {
        let max_attempts = env_or_default("PBG_CALLBACK_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS).max(1);
        let backoff_base =
            Duration::from_secs(env_or_default("PBG_CALLBACK_BACKOFF_SECS", DEFAULT_BACKOFF_BASE.as_secs()));
        let poll_interval =
            Duration::from_secs(env_or_default("PBG_CALLBACK_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL.as_secs()));
        let batch_size = env_or_default("PBG_CALLBACK_BATCH_SIZE", DEFAULT_BATCH_SIZE);
        let keep_completed = env_or_default("PBG_CALLBACK_KEEP_COMPLETED", DEFAULT_KEEP_COMPLETED);
        let keep_failed = env_or_default("PBG_CALLBACK_KEEP_FAILED", DEFAULT_KEEP_FAILED);
        Self { max_attempts, backoff_base, poll_interval, batch_size, keep_completed, keep_failed }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.backoff_base)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            batch_size: self.batch_size,
            retry: self.retry_policy(),
            retention: RetentionPolicy { keep_completed: self.keep_completed, keep_failed: self.keep_failed },
            ..Default::default()
        }
    }
}

//-------------------------------------------------  WebhookAccess  ----------------------------------------------------
/// The subset of the configuration that decides who may call the webhook scope. Kept apart from [`ServerConfig`] so
/// that no secrets are passed into request middleware.
#[derive(Clone, Debug, Default)]
pub struct WebhookAccess {
    pub whitelist: Option<Vec<IpAddr>>,
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl WebhookAccess {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            whitelist: config.webhook_whitelist.clone(),
            use_x_forwarded_for: config.use_x_forwarded_for,
            use_forwarded: config.use_forwarded,
        }
    }
}

//-------------------------------------------------  Helpers  ----------------------------------------------------------
fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

/// Parses a comma-separated list of IP addresses. "none", "false" and "0" disable the whitelist. Invalid entries are
/// logged and skipped.
pub fn parse_whitelist(s: &str) -> Option<Vec<IpAddr>> {
    if ["none", "false", "0"].contains(&s.trim().to_lowercase().as_str()) {
        info!(
            "🪛️ Webhook IP whitelist is disabled. If this is not what you want, set PBG_WEBHOOK_IP_WHITELIST to a \
             comma-separated list of IP addresses to enable it."
        );
        return None;
    }
    let ip_addrs = s
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            s.parse()
                .map_err(|e| {
                    warn!("🪛️ Ignoring invalid IP address ({s}) in PBG_WEBHOOK_IP_WHITELIST: {e}");
                })
                .ok()
        })
        .collect::<Vec<IpAddr>>();
    Some(ip_addrs)
}

fn log_whitelist(whitelist: &Option<Vec<IpAddr>>) {
    match whitelist {
        Some(whitelist) if whitelist.is_empty() => {
            warn!(
                "🚨️ The webhook IP whitelist was configured, but is empty. The server will run, but won't accept any \
                 webhook deliveries."
            );
        },
        None => {
            info!("🪛️ No webhook IP whitelist is set. Only signature validation will be used.");
        },
        Some(v) => {
            let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
            info!("🪛️ Webhook IP whitelist: {addrs}");
        },
    }
}
