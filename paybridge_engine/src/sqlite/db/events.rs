use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::DeadLetterEvent,
    sqlite::db::is_unique_violation,
    traits::{NewDeadLetter, PaymentGatewayError},
};

/// Appends `event_id` to the processed-event ledger. Returns `false` if the event id is already there.
///
/// The primary key on `event_id` makes this the atomic idempotency check. Do not replace it with a read followed by an
/// insert.
pub async fn insert_processed_event(event_id: &str, conn: &mut SqliteConnection) -> Result<bool, PaymentGatewayError> {
    let result = sqlx::query("INSERT INTO processed_events (event_id, processed_at) VALUES ($1, $2)")
        .bind(event_id)
        .bind(Utc::now())
        .execute(conn)
        .await;
    match result {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => {
            debug!("🗃️ Event {event_id} is already in the ledger");
            Ok(false)
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn event_exists(event_id: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_events WHERE event_id = $1")
        .bind(event_id)
        .fetch_one(conn)
        .await?;
    Ok(count > 0)
}

/// Parks an event in the dead-letter ledger. Returns `false` if it was already parked.
pub async fn insert_dead_letter(letter: NewDeadLetter, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO dead_letter_events (event_id, event_type, intent_id, reason, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(letter.event_id)
    .bind(letter.event_type)
    .bind(letter.intent_id.map(|id| id.0))
    .bind(letter.reason)
    .bind(letter.payload)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn fetch_dead_letters(conn: &mut SqliteConnection) -> Result<Vec<DeadLetterEvent>, sqlx::Error> {
    let letters = sqlx::query_as("SELECT * FROM dead_letter_events ORDER BY created_at ASC").fetch_all(conn).await?;
    Ok(letters)
}
