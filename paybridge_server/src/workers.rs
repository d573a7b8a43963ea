//! Background jobs that run on a fixed interval alongside the HTTP server.
//!
//! Two jobs are scheduled: the reconciliation sweep and the partner callback worker. A tick that comes due while the
//! previous run is still going is skipped rather than queued up.
use std::time::Duration;

use log::*;
use paybridge_engine::{
    callbacks::{CallbackTransport, CallbackWorker},
    CallbackDispatch,
    CallbackQueue,
    DistributedLock,
    PaymentGatewayDatabase,
    PaymentProcessor,
    ReconciliationSweep,
    SweepOutcome,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[allow(async_fn_in_trait)]
pub trait PeriodicJob {
    fn name(&self) -> &'static str;

    /// Runs the job once. Errors are the job's own business and should be logged, not returned.
    async fn run(&self);
}

/// Starts a periodic worker on the current actix system. The first run happens immediately. Do not await the returned
/// JoinHandle, as it will run indefinitely.
pub fn start_periodic_worker<J>(job: J, interval: Duration) -> JoinHandle<()>
where
    J: PeriodicJob + 'static,
{
    let interval = interval.max(MIN_INTERVAL);
    actix_web::rt::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("🕰️ {} worker started. Running every {}s", job.name(), interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running {} job", job.name());
            job.run().await;
        }
    })
}

//--------------------------------------------   SweepJob   ------------------------------------------------------------
pub struct SweepJob<B, P, L, D> {
    sweep: ReconciliationSweep<B, P, L, D>,
}

impl<B, P, L, D> SweepJob<B, P, L, D> {
    pub fn new(sweep: ReconciliationSweep<B, P, L, D>) -> Self {
        Self { sweep }
    }
}

impl<B, P, L, D> PeriodicJob for SweepJob<B, P, L, D>
where
    B: PaymentGatewayDatabase,
    P: PaymentProcessor,
    L: DistributedLock,
    D: CallbackDispatch,
{
    fn name(&self) -> &'static str {
        "Reconciliation sweep"
    }

    async fn run(&self) {
        match self.sweep.run().await {
            Ok(SweepOutcome::Completed(report)) => {
                info!(
                    "🕰️ Sweep examined {} payments: {} completed, {} canceled, {} expired, {} skipped. {} lost notifications re-sent",
                    report.examined, report.completed, report.canceled, report.expired, report.skipped, report.renotified
                );
            },
            Ok(SweepOutcome::LockNotAcquired) => debug!("🕰️ Sweep skipped. Another instance is sweeping."),
            Err(e) => error!("🕰️ Error running the reconciliation sweep: {e}"),
        }
    }
}

//--------------------------------------------  CallbackJob  -----------------------------------------------------------
pub struct CallbackDeliveryJob<Q, T> {
    worker: CallbackWorker<Q, T>,
}

impl<Q, T> CallbackDeliveryJob<Q, T> {
    pub fn new(worker: CallbackWorker<Q, T>) -> Self {
        Self { worker }
    }
}

impl<Q, T> PeriodicJob for CallbackDeliveryJob<Q, T>
where
    Q: CallbackQueue,
    T: CallbackTransport,
{
    fn name(&self) -> &'static str {
        "Partner callback"
    }

    async fn run(&self) {
        match self.worker.run_once().await {
            Ok(report) if report.claimed > 0 => {
                info!(
                    "🕰️ {} callbacks delivered, {} rescheduled, {} dropped, {} left for a later pass",
                    report.delivered, report.retried, report.dead, report.errors
                );
            },
            Ok(_) => {},
            Err(e) => error!("🕰️ Error running the callback worker: {e}"),
        }
    }
}
