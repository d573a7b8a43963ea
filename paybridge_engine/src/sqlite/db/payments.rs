use chrono::Utc;
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{IntentId, NewPayment, Payment, PaymentStatus},
    sqlite::db::is_unique_violation,
    traits::PaymentGatewayError,
};

/// Inserts a new payment using the given connection. This is not atomic. You can embed this call inside a transaction
/// if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
pub async fn insert_payment(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, PaymentGatewayError> {
    let intent_id = payment.intent_id.clone();
    let meta = payment.metadata;
    let result: Result<Payment, sqlx::Error> = sqlx::query_as(
        r#"
            INSERT INTO payments (
                intent_id,
                owner_id,
                amount,
                currency,
                status,
                pay_account,
                ordernum,
                description,
                payment_type,
                project,
                sum,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *;
        "#,
    )
    .bind(payment.intent_id.as_str())
    .bind(payment.owner_id)
    .bind(payment.amount.value())
    .bind(payment.currency)
    .bind(payment.status.to_string())
    .bind(meta.account)
    .bind(meta.ordernum)
    .bind(meta.description)
    .bind(meta.payment_type)
    .bind(meta.project)
    .bind(meta.sum)
    .bind(payment.created_at)
    .bind(payment.created_at)
    .fetch_one(conn)
    .await;
    match result {
        Ok(payment) => {
            debug!("🗃️ Payment #{} for intent {intent_id} inserted with status {}", payment.id, payment.status);
            Ok(payment)
        },
        Err(e) if is_unique_violation(&e) => Err(PaymentGatewayError::PaymentAlreadyExists(intent_id)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn fetch_payment_by_intent(
    intent_id: &IntentId,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE intent_id = $1")
        .bind(intent_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

/// Pending payments that have an intent, oldest first.
pub async fn fetch_pending_payments(limit: u32, conn: &mut SqliteConnection) -> Result<Vec<Payment>, sqlx::Error> {
    let payments = sqlx::query_as(
        r#"
        SELECT * FROM payments
        WHERE status = 'pending' AND intent_id IS NOT NULL
        ORDER BY created_at ASC, id ASC
        LIMIT $1
        "#,
    )
    .bind(i64::from(limit))
    .fetch_all(conn)
    .await?;
    Ok(payments)
}

pub async fn fetch_payments_for_owner(
    owner_id: i64,
    status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    let payments = sqlx::query_as("SELECT * FROM payments WHERE owner_id = $1 AND status = $2 ORDER BY created_at ASC")
        .bind(owner_id)
        .bind(status.to_string())
        .fetch_all(conn)
        .await?;
    Ok(payments)
}

/// Moves the payment for `intent_id` out of `pending`. The update only happens if the payment is currently pending;
/// otherwise `None` is returned and nothing changes. `description` and `payment_type` replace the stored values when
/// they are given.
pub async fn update_status_if_pending(
    intent_id: &IntentId,
    status: PaymentStatus,
    description: Option<&str>,
    payment_type: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, PaymentGatewayError> {
    if !PaymentStatus::Pending.can_transition_to(status) {
        return Err(PaymentGatewayError::PaymentStatusUpdateError(format!("Cannot move a pending payment to {status}")));
    }
    let payment: Option<Payment> = sqlx::query_as(
        r#"
        UPDATE payments SET
            status = $1,
            description = COALESCE($2, description),
            payment_type = COALESCE($3, payment_type),
            updated_at = $4
        WHERE intent_id = $5 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(status.to_string())
    .bind(description)
    .bind(payment_type)
    .bind(Utc::now())
    .bind(intent_id.as_str())
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Status update to {status} for intent {intent_id}. Applied: {}", payment.is_some());
    Ok(payment)
}

pub async fn update_payment_type(
    intent_id: &IntentId,
    payment_type: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("UPDATE payments SET payment_type = $1, updated_at = $2 WHERE intent_id = $3 RETURNING *")
        .bind(payment_type)
        .bind(Utc::now())
        .bind(intent_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}
