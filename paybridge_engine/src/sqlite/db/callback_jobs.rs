use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    callbacks::{CallbackJob, RetentionPolicy, RetryPolicy},
    traits::{FailureOutcome, JobState, QueueError, QueuedJob},
};

#[derive(Debug, Clone, FromRow)]
struct JobRow {
    id: i64,
    method: String,
    callback_url: String,
    params: String,
    state: String,
    attempts: i64,
    max_attempts: i64,
    next_attempt_at: i64,
    last_error: Option<String>,
}

impl TryFrom<JobRow> for QueuedJob {
    type Error = QueueError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let method = row.method.parse().map_err(|e| QueueError::Serialization(format!("{e}")))?;
        let params: BTreeMap<String, String> = serde_json::from_str(&row.params)?;
        let state: JobState = row.state.parse().map_err(|e| QueueError::Serialization(format!("{e}")))?;
        let next_attempt_at = DateTime::<Utc>::from_timestamp_millis(row.next_attempt_at).ok_or_else(|| {
            QueueError::Serialization(format!("Invalid next_attempt_at {} for job {}", row.next_attempt_at, row.id))
        })?;
        Ok(Self {
            id: row.id,
            job: CallbackJob { method, callback_url: row.callback_url, params },
            state,
            attempts: u32::try_from(row.attempts).unwrap_or_default(),
            max_attempts: u32::try_from(row.max_attempts).unwrap_or_default(),
            next_attempt_at,
            last_error: row.last_error,
        })
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Adds a job that is due at `now`. Returns the job id.
pub async fn enqueue(
    job: &CallbackJob,
    max_attempts: u32,
    now: i64,
    conn: &mut SqliteConnection,
) -> Result<i64, QueueError> {
    let params = serde_json::to_string(&job.params)?;
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO callback_jobs (method, callback_url, params, state, attempts, max_attempts, next_attempt_at, created_at)
        VALUES ($1, $2, $3, 'waiting', 0, $4, $5, $5)
        RETURNING id
        "#,
    )
    .bind(job.method.as_str())
    .bind(&job.callback_url)
    .bind(params)
    .bind(i64::from(max_attempts))
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("📮️ Callback job #{id} enqueued");
    Ok(id)
}

/// Claims up to `limit` jobs that are due at `now`, oldest first. This includes active jobs whose visibility timeout
/// has lapsed. Claimed jobs become `active` and are hidden until `now + visibility`.
pub async fn claim_due(
    limit: u32,
    visibility: Duration,
    now: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<QueuedJob>, QueueError> {
    let hidden_until = now.saturating_add(millis(visibility));
    let rows: Vec<JobRow> = sqlx::query_as(
        r#"
        UPDATE callback_jobs SET state = 'active', next_attempt_at = $1
        WHERE id IN (
            SELECT id FROM callback_jobs
            WHERE state IN ('waiting', 'active') AND next_attempt_at <= $2
            ORDER BY next_attempt_at ASC, id ASC
            LIMIT $3
        )
        RETURNING *
        "#,
    )
    .bind(hidden_until)
    .bind(now)
    .bind(i64::from(limit))
    .fetch_all(conn)
    .await?;
    let mut jobs = rows.into_iter().map(QueuedJob::try_from).collect::<Result<Vec<_>, _>>()?;
    jobs.sort_by_key(|j| j.id);
    Ok(jobs)
}

pub async fn fetch_job(id: i64, conn: &mut SqliteConnection) -> Result<Option<QueuedJob>, QueueError> {
    let row: Option<JobRow> =
        sqlx::query_as("SELECT * FROM callback_jobs WHERE id = $1").bind(id).fetch_optional(conn).await?;
    row.map(QueuedJob::try_from).transpose()
}

pub async fn mark_completed(id: i64, now: i64, conn: &mut SqliteConnection) -> Result<(), QueueError> {
    let job = fetch_job(id, &mut *conn).await?.ok_or(QueueError::JobNotFound(id))?;
    if matches!(job.state, JobState::Completed | JobState::Failed) {
        return Err(QueueError::JobFinished(id));
    }
    sqlx::query("UPDATE callback_jobs SET state = 'completed', finished_at = $1 WHERE id = $2")
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Records a failed attempt. The job goes back to `waiting` with the backoff delay from `policy`, or to `failed` once
/// it has failed `max_attempts` times.
pub async fn mark_failed(
    id: i64,
    error: &str,
    policy: &RetryPolicy,
    now: i64,
    conn: &mut SqliteConnection,
) -> Result<FailureOutcome, QueueError> {
    let job = fetch_job(id, &mut *conn).await?.ok_or(QueueError::JobNotFound(id))?;
    if matches!(job.state, JobState::Completed | JobState::Failed) {
        return Err(QueueError::JobFinished(id));
    }
    let attempts = job.attempts + 1;
    if attempts >= job.max_attempts {
        sqlx::query(
            "UPDATE callback_jobs SET state = 'failed', attempts = $1, last_error = $2, finished_at = $3 WHERE id = $4",
        )
        .bind(i64::from(attempts))
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
        return Ok(FailureOutcome::Dead { attempts });
    }
    let delay = policy.delay_for(attempts);
    let next = now.saturating_add(millis(delay));
    sqlx::query(
        r#"
        UPDATE callback_jobs SET state = 'waiting', attempts = $1, last_error = $2, next_attempt_at = $3
        WHERE id = $4
        "#,
    )
    .bind(i64::from(attempts))
    .bind(error)
    .bind(next)
    .bind(id)
    .execute(conn)
    .await?;
    let next_attempt_at = DateTime::<Utc>::from_timestamp_millis(next).unwrap_or_else(Utc::now);
    Ok(FailureOutcome::Retry { attempt: attempts, delay, next_attempt_at })
}

/// Deletes the oldest finished jobs beyond the retention limits.
pub async fn prune(retention: &RetentionPolicy, conn: &mut SqliteConnection) -> Result<u64, QueueError> {
    let mut removed = 0;
    for (state, keep) in [("completed", retention.keep_completed), ("failed", retention.keep_failed)] {
        let result = sqlx::query(
            r#"
            DELETE FROM callback_jobs
            WHERE state = $1 AND id NOT IN (
                SELECT id FROM callback_jobs WHERE state = $1 ORDER BY finished_at DESC, id DESC LIMIT $2
            )
            "#,
        )
        .bind(state)
        .bind(i64::from(keep))
        .execute(&mut *conn)
        .await?;
        removed += result.rows_affected();
    }
    if removed > 0 {
        debug!("📮️ Pruned {removed} finished callback jobs");
    }
    Ok(removed)
}

pub async fn count_in_state(state: JobState, conn: &mut SqliteConnection) -> Result<i64, QueueError> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM callback_jobs WHERE state = $1")
        .bind(state.to_string())
        .fetch_one(conn)
        .await?;
    Ok(count)
}
