//! Verification of signed webhook payloads.
//!
//! The processor signs every webhook with HMAC-SHA256 keyed by the endpoint's signing secret. The signature header
//! looks like `t=1717243200,v1=5257a869...,v1=...`: `t` is the unix time of signing and each `v1` entry is a hex
//! encoded HMAC over `"{t}.{raw body}"`. More than one `v1` entry is present while a secret is being rolled.
use chrono::Utc;
use hmac::{Hmac, Mac};
use log::*;
use pbg_common::Secret;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("No signature header was provided")]
    MissingHeader,
    #[error("Malformed signature header: {0}")]
    MalformedHeader(String),
    #[error("The signature header contains no v1 signatures")]
    NoSignatures,
    #[error("The signature timestamp {timestamp} is outside the tolerance window ({tolerance}s)")]
    StaleTimestamp { timestamp: i64, tolerance: i64 },
    #[error("No signatures found matching the expected signature for the payload")]
    Mismatch,
    #[error("The signing secret cannot be used as an HMAC key")]
    InvalidKey,
}

#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Secret<String>,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: Secret<String>, tolerance_secs: i64) -> Self {
        Self { secret, tolerance_secs }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_configured()
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verifies `payload` against `header` as if the current unix time were `now`.
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), SignatureError> {
        let header = header.trim();
        if header.is_empty() {
            return Err(SignatureError::MissingHeader);
        }
        let (timestamp, signatures) = parse_header(header)?;
        if signatures.is_empty() {
            return Err(SignatureError::NoSignatures);
        }
        if self.tolerance_secs > 0 && now.abs_diff(timestamp) > self.tolerance_secs.unsigned_abs() {
            return Err(SignatureError::StaleTimestamp { timestamp, tolerance: self.tolerance_secs });
        }
        let mac = self.mac_for(timestamp, payload)?;
        let matched = signatures.iter().any(|sig| mac.clone().verify_slice(sig).is_ok());
        if matched {
            trace!("🪝️ Webhook signature verified");
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Produces a valid signature header for `payload`, signed at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        let mac = self.mac_for(timestamp, payload)?;
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("t={timestamp},v1={signature}"))
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.reveal().as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

fn parse_header(header: &str) -> Result<(i64, Vec<Vec<u8>>), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for item in header.split(',') {
        let (key, value) = item
            .trim()
            .split_once('=')
            .ok_or_else(|| SignatureError::MalformedHeader(format!("'{item}' is not a key=value pair")))?;
        match key {
            "t" => {
                let t = value
                    .parse::<i64>()
                    .map_err(|_| SignatureError::MalformedHeader(format!("'{value}' is not a timestamp")))?;
                timestamp = Some(t);
            },
            "v1" => match hex::decode(value) {
                Ok(sig) => signatures.push(sig),
                Err(_) => debug!("🪝️ Ignoring non-hex v1 signature in webhook header"),
            },
            // Other schemes (e.g. v0 test signatures) are ignored
            _ => {},
        }
    }
    let timestamp = timestamp.ok_or_else(|| SignatureError::MalformedHeader("no timestamp".into()))?;
    Ok((timestamp, signatures))
}
