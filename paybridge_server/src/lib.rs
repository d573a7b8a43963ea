//! # PayBridge server
//! This crate hosts the HTTP face of the payment bridge. It is responsible for:
//! Receiving processor webhooks and handing them to the engine's webhook processor.
//! Serving the checkout helpers used by the payment page (opening an intent, recording the payment method, and
//! redirecting the payer back to the partner).
//! Running the periodic jobs: the reconciliation sweep and the partner callback worker.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/stripe/webhook`: Processor webhook deliveries. Optionally restricted to an IP whitelist.
//! * `/pay/intent`, `/pay/set-method`, `/pay/success`: Checkout helpers.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;

pub mod helpers;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;
