//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interaction are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool,
//! or create an atomic transaction as the need arises and call through to the functions without any other changes.
use std::env;

use chrono::Utc;
use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod callback_jobs;
pub mod events;
pub mod locks;
pub mod notifications;
pub mod owners;
pub mod payments;

const SQLITE_DB_URL: &str = "sqlite://data/paybridge.db";

pub fn db_url() -> String {
    let result = env::var("PBG_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ PBG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

/// True if the error is a violation of a UNIQUE or PRIMARY KEY constraint.
pub fn is_unique_violation(e: &SqlxError) -> bool {
    e.as_database_error().map(|d| d.is_unique_violation()).unwrap_or(false)
}

/// The current time in unix milliseconds. Queue and lock timestamps are stored in this form.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
