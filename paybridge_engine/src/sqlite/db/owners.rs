use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOwner, Owner},
    sqlite::db::is_unique_violation,
    traits::PaymentGatewayError,
};

pub async fn insert_owner(owner: NewOwner, conn: &mut SqliteConnection) -> Result<Owner, PaymentGatewayError> {
    let public_key = owner.public_key.trim().to_string();
    let result: Result<Owner, sqlx::Error> = sqlx::query_as(
        "INSERT INTO owners (public_key, callback_url, redirect_url, created_at) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(&public_key)
    .bind(owner.callback_url)
    .bind(owner.redirect_url)
    .bind(chrono::Utc::now())
    .fetch_one(conn)
    .await;
    match result {
        Ok(owner) => {
            debug!("🗃️ Owner #{} created for public key {public_key}", owner.id);
            Ok(owner)
        },
        Err(e) if is_unique_violation(&e) => Err(PaymentGatewayError::OwnerAlreadyExists(public_key)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_owner(id: i64, conn: &mut SqliteConnection) -> Result<Option<Owner>, sqlx::Error> {
    let owner = sqlx::query_as("SELECT * FROM owners WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(owner)
}

pub async fn fetch_owner_by_public_key(
    public_key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Owner>, sqlx::Error> {
    let owner = sqlx::query_as("SELECT * FROM owners WHERE public_key = $1")
        .bind(public_key.trim())
        .fetch_optional(conn)
        .await?;
    Ok(owner)
}

pub async fn update_owner_urls(
    id: i64,
    callback_url: Option<String>,
    redirect_url: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<Owner, PaymentGatewayError> {
    let owner: Option<Owner> =
        sqlx::query_as("UPDATE owners SET callback_url = $1, redirect_url = $2 WHERE id = $3 RETURNING *")
            .bind(callback_url)
            .bind(redirect_url)
            .bind(id)
            .fetch_optional(conn)
            .await?;
    owner.ok_or(PaymentGatewayError::OwnerNotFound(id))
}
