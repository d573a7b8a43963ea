use log::trace;
use sqlx::SqliteConnection;

/// Takes the lock `key` for `holder` until `expires_at` (unix ms), unless the lock is held under an unexpired lease.
/// The lock is not reentrant: a holder that already has the lease gets `false` as well. This is a single statement,
/// so two callers can never both succeed.
pub async fn try_acquire(
    key: &str,
    holder: &str,
    expires_at: i64,
    now: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO sweep_locks (key, holder, expires_at) VALUES ($1, $2, $3)
        ON CONFLICT (key) DO UPDATE SET holder = excluded.holder, expires_at = excluded.expires_at
        WHERE sweep_locks.expires_at < $4
        "#,
    )
    .bind(key)
    .bind(holder)
    .bind(expires_at)
    .bind(now)
    .execute(conn)
    .await?;
    let acquired = result.rows_affected() == 1;
    trace!("🗃️ Lock {key} acquired by {holder}: {acquired}");
    Ok(acquired)
}

pub async fn release(key: &str, holder: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM sweep_locks WHERE key = $1 AND holder = $2").bind(key).bind(holder).execute(conn).await?;
    Ok(result.rows_affected() == 1)
}
