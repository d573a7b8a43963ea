use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::Payment;

/// Flags `payment_id` as settled but not yet reported to the partner. `settled_at` is in unix ms.
pub async fn insert_unreported(payment_id: i64, settled_at: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO unreported_payments (payment_id, settled_at) VALUES ($1, $2)")
        .bind(payment_id)
        .bind(settled_at)
        .execute(conn)
        .await?;
    Ok(())
}

/// Up to `limit` unreported payments that settled before `settled_before` (unix ms), oldest first.
pub async fn fetch_unreported(
    settled_before: i64,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    let payments = sqlx::query_as(
        r#"
        SELECT payments.* FROM payments
        JOIN unreported_payments ON unreported_payments.payment_id = payments.id
        WHERE unreported_payments.settled_at < $1
        ORDER BY unreported_payments.settled_at ASC
        LIMIT $2
        "#,
    )
    .bind(settled_before)
    .bind(i64::from(limit))
    .fetch_all(conn)
    .await?;
    Ok(payments)
}

pub async fn delete_unreported(payment_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM unreported_payments WHERE payment_id = $1").bind(payment_id).execute(conn).await?;
    trace!("🗃️ Payment #{payment_id} reported: {}", result.rows_affected() == 1);
    Ok(result.rows_affected() == 1)
}
