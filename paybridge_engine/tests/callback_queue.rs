use std::time::Duration;

use paybridge_engine::{
    callbacks::{
        CallbackDispatch,
        CallbackDispatcher,
        CallbackJob,
        CallbackMethod,
        CallbackParams,
        CallbackTransport,
        CallbackWorker,
        DeliveryError,
        RetentionPolicy,
        RetryPolicy,
        WorkerConfig,
    },
    test_utils::{test_database, FakeTransport, UnavailableQueue},
    traits::{CallbackQueue, FailureOutcome, JobState, QueueError},
    SqliteDatabase,
};

fn job(account: &str) -> CallbackJob {
    let params = CallbackParams::new().with("account", Some(account)).with("desc", Some("  "));
    CallbackJob::new(CallbackMethod::Pay, "https://partner.example/cb?key=abc", params)
}

/// Retries become due straight away, so a test can drive a job through all its attempts.
fn impatient_worker_config() -> WorkerConfig {
    WorkerConfig { retry: RetryPolicy::new(5, Duration::ZERO), ..Default::default() }
}

#[tokio::test]
async fn failed_jobs_back_off_then_die() {
    let db = test_database().await;
    let policy = RetryPolicy::default();
    let id = db.enqueue(&job("acc1"), &policy).await.unwrap();

    let mut delays = Vec::new();
    for _ in 0..4 {
        match db.mark_failed(id, "503 Service Unavailable", &policy).await.unwrap() {
            FailureOutcome::Retry { delay, .. } => delays.push(delay.as_secs()),
            FailureOutcome::Dead { .. } => panic!("job died too early"),
        }
    }
    assert_eq!(delays, vec![60, 120, 240, 480]);
    let last = db.mark_failed(id, "503 Service Unavailable", &policy).await.unwrap();
    assert_eq!(last, FailureOutcome::Dead { attempts: 5 });

    let stored = db.fetch_job(id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    assert_eq!(stored.attempts, 5);
    assert_eq!(stored.last_error.as_deref(), Some("503 Service Unavailable"));
    assert!(matches!(db.mark_failed(id, "again", &policy).await, Err(QueueError::JobFinished(_))));
    assert!(db.claim_due(10, Duration::from_secs(300)).await.unwrap().is_empty());
}

#[tokio::test]
async fn retried_jobs_wait_for_their_backoff() {
    let db = test_database().await;
    let policy = RetryPolicy::default();
    let id = db.enqueue(&job("acc1"), &policy).await.unwrap();
    let claimed = db.claim_due(10, Duration::from_secs(300)).await.unwrap();
    assert_eq!(claimed.len(), 1);
    let outcome = db.mark_failed(id, "timeout", &policy).await.unwrap();
    let FailureOutcome::Retry { next_attempt_at, .. } = outcome else { panic!("expected a retry") };
    let stored = db.fetch_job(id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Waiting);
    assert_eq!(stored.next_attempt_at, next_attempt_at);
    assert!(db.claim_due(10, Duration::from_secs(300)).await.unwrap().is_empty());
}

#[tokio::test]
async fn claimed_jobs_are_hidden_until_their_visibility_lapses() {
    let db = test_database().await;
    let policy = RetryPolicy::default();
    let first = db.enqueue(&job("acc1"), &policy).await.unwrap();
    let second = db.enqueue(&job("acc2"), &policy).await.unwrap();

    let claimed = db.claim_due(10, Duration::from_secs(300)).await.unwrap();
    assert_eq!(claimed.iter().map(|j| j.id).collect::<Vec<_>>(), vec![first, second]);
    assert!(claimed.iter().all(|j| j.state == JobState::Active));
    assert_eq!(claimed[0].job, job("acc1"));
    assert!(db.claim_due(10, Duration::from_secs(300)).await.unwrap().is_empty());

    // A worker that claims with no visibility window and then disappears leaves the jobs claimable
    let third = db.enqueue(&job("acc3"), &policy).await.unwrap();
    assert_eq!(db.claim_due(10, Duration::ZERO).await.unwrap().len(), 1);
    let reclaimed = db.claim_due(10, Duration::from_secs(300)).await.unwrap();
    assert_eq!(reclaimed.iter().map(|j| j.id).collect::<Vec<_>>(), vec![third]);
}

#[tokio::test]
async fn worker_delivers_and_completes() {
    let db = test_database().await;
    let transport = FakeTransport::always(200);
    let worker = CallbackWorker::new(db.clone(), transport.clone(), WorkerConfig::default());
    let id = db.enqueue(&job("acc1"), &RetryPolicy::default()).await.unwrap();

    let report = worker.run_once().await.unwrap();
    assert_eq!((report.claimed, report.delivered), (1, 1));
    assert_eq!(db.fetch_job(id).await.unwrap().unwrap().state, JobState::Completed);
    assert_eq!(transport.attempts(), vec![
        "https://partner.example/cb?key=abc&method=pay&params%5Baccount%5D=acc1".to_string()
    ]);
    assert!(matches!(db.mark_completed(id).await, Err(QueueError::JobFinished(_))));
}

#[tokio::test]
async fn worker_retries_until_the_partner_answers() {
    let db = test_database().await;
    let config = impatient_worker_config();
    let transport = FakeTransport::scripted(&[500, 0], 204);
    let worker = CallbackWorker::new(db.clone(), transport.clone(), config);
    let id = db.enqueue(&job("acc1"), &config.retry).await.unwrap();

    assert_eq!(worker.run_once().await.unwrap().retried, 1);
    assert_eq!(worker.run_once().await.unwrap().retried, 1);
    assert_eq!(worker.run_once().await.unwrap().delivered, 1);
    let stored = db.fetch_job(id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Completed);
    assert_eq!(stored.attempts, 2);
    assert_eq!(transport.attempts().len(), 3);
}

#[tokio::test]
async fn worker_drops_jobs_after_five_failures() {
    let db = test_database().await;
    let config = impatient_worker_config();
    let transport = FakeTransport::always(503);
    let worker = CallbackWorker::new(db.clone(), transport.clone(), config);
    let id = db.enqueue(&job("acc1"), &config.retry).await.unwrap();

    for _ in 0..4 {
        assert_eq!(worker.run_once().await.unwrap().retried, 1);
    }
    assert_eq!(worker.run_once().await.unwrap().dead, 1);
    assert_eq!(worker.run_once().await.unwrap().claimed, 0);
    assert_eq!(db.fetch_job(id).await.unwrap().unwrap().state, JobState::Failed);
    assert_eq!(transport.attempts().len(), 5);
}

#[tokio::test]
async fn finished_jobs_are_pruned_beyond_retention() {
    let db = test_database().await;
    let policy = RetryPolicy::new(1, Duration::ZERO);
    let mut ids = Vec::new();
    for i in 0..3 {
        ids.push(db.enqueue(&job(&format!("acc{i}")), &policy).await.unwrap());
    }
    let dead = db.enqueue(&job("dead"), &policy).await.unwrap();
    db.claim_due(10, Duration::from_secs(300)).await.unwrap();
    for id in &ids {
        db.mark_completed(*id).await.unwrap();
    }
    assert_eq!(db.mark_failed(dead, "gone", &policy).await.unwrap(), FailureOutcome::Dead { attempts: 1 });

    let removed = db.prune(&RetentionPolicy { keep_completed: 1, keep_failed: 1 }).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(db.count_jobs(JobState::Completed).await.unwrap(), 1);
    assert_eq!(db.count_jobs(JobState::Failed).await.unwrap(), 1);
    assert!(db.fetch_job(ids[2]).await.unwrap().is_some());
}

#[tokio::test]
async fn dispatcher_queues_jobs() {
    let db = test_database().await;
    let transport = FakeTransport::always(200);
    let dispatcher = CallbackDispatcher::new(db.clone(), transport.clone(), RetryPolicy::default());
    dispatcher.dispatch(job("acc1")).await;
    assert_eq!(db.count_jobs(JobState::Waiting).await.unwrap(), 1);
    assert!(transport.attempts().is_empty());
}

#[tokio::test]
async fn dispatcher_falls_back_to_one_direct_delivery() {
    let transport = FakeTransport::always(200);
    let dispatcher = CallbackDispatcher::new(UnavailableQueue, transport.clone(), RetryPolicy::default());
    dispatcher.dispatch(job("acc1")).await;
    assert_eq!(transport.attempts().len(), 1);

    let failing = FakeTransport::always(500);
    let dispatcher = CallbackDispatcher::new(UnavailableQueue, failing.clone(), RetryPolicy::default());
    dispatcher.dispatch(job("acc1")).await;
    dispatcher.dispatch(job("acc2")).await;
    assert_eq!(failing.attempts().len(), 2);
}

/// Delivers everything, but while delivering `contested` another worker finishes that job first.
#[derive(Clone)]
struct ContestedTransport {
    queue: SqliteDatabase,
    contested: i64,
    inner: FakeTransport,
}

impl CallbackTransport for ContestedTransport {
    async fn deliver(&self, job: &CallbackJob) -> Result<(), DeliveryError> {
        self.inner.deliver(job).await?;
        if job.params.get("params[account]").map(String::as_str) == Some("acc1") {
            self.queue.mark_completed(self.contested).await.expect("other worker finishes the job");
        }
        Ok(())
    }
}

#[tokio::test]
async fn one_bad_job_does_not_stall_the_batch() {
    let db = test_database().await;
    let first = db.enqueue(&job("acc1"), &RetryPolicy::default()).await.unwrap();
    let second = db.enqueue(&job("acc2"), &RetryPolicy::default()).await.unwrap();
    let inner = FakeTransport::always(200);
    let transport = ContestedTransport { queue: db.clone(), contested: first, inner: inner.clone() };
    let worker = CallbackWorker::new(db.clone(), transport, WorkerConfig::default());

    let report = worker.run_once().await.unwrap();
    assert_eq!((report.claimed, report.delivered, report.errors), (2, 1, 1));
    assert_eq!(inner.attempts().len(), 2);
    assert_eq!(db.fetch_job(second).await.unwrap().unwrap().state, JobState::Completed);
    assert_eq!(db.count_jobs(JobState::Active).await.unwrap(), 0);
}
