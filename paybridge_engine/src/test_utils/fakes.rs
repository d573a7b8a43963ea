//! In-memory stand-ins for the engine's external collaborators.
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use pbg_common::MinorUnits;

use crate::{
    callbacks::{CallbackDispatch, CallbackJob, CallbackTransport, DeliveryError, RetentionPolicy, RetryPolicy},
    db_types::IntentId,
    processor::{Intent, IntentStatus, PaymentProcessor, ProcessorError, UNEXPECTED_STATE_CODE},
    traits::{CallbackQueue, FailureOutcome, QueueError, QueuedJob},
};

//--------------------------------------     FakeProcessor     ---------------------------------------------------------
/// What the fake processor does when asked to cancel an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelBehaviour {
    Cancel,
    UnexpectedState,
    Fail,
}

#[derive(Default)]
struct ProcessorState {
    intents: HashMap<IntentId, Intent>,
    wallets: HashMap<IntentId, String>,
    unreachable: HashSet<IntentId>,
    cancel_behaviour: HashMap<IntentId, CancelBehaviour>,
    canceled: Vec<IntentId>,
    next_id: u64,
}

/// A processor that keeps its intents in memory.
#[derive(Clone, Default)]
pub struct FakeProcessor {
    state: Arc<Mutex<ProcessorState>>,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_intent(&self, intent: Intent) {
        self.state.lock().unwrap().intents.insert(intent.id.clone(), intent);
    }

    /// Adds an intent for `amount` minor units with the given status and metadata.
    pub fn add_intent(&self, id: &str, status: IntentStatus, amount: i64, currency: &str, metadata: &[(&str, &str)]) {
        let intent = Intent {
            id: IntentId::new(id),
            status,
            amount: MinorUnits::from(amount),
            currency: currency.to_lowercase(),
            metadata: metadata.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            client_secret: Some(format!("{id}_secret")),
        };
        self.insert_intent(intent);
    }

    pub fn set_status(&self, id: &IntentId, status: IntentStatus) {
        if let Some(intent) = self.state.lock().unwrap().intents.get_mut(id) {
            intent.status = status;
        }
    }

    pub fn set_wallet(&self, id: &IntentId, wallet: &str) {
        self.state.lock().unwrap().wallets.insert(id.clone(), wallet.to_string());
    }

    /// Queries for this intent fail with a transport error.
    pub fn make_unreachable(&self, id: &IntentId) {
        self.state.lock().unwrap().unreachable.insert(id.clone());
    }

    pub fn on_cancel(&self, id: &IntentId, behaviour: CancelBehaviour) {
        self.state.lock().unwrap().cancel_behaviour.insert(id.clone(), behaviour);
    }

    pub fn intent(&self, id: &IntentId) -> Option<Intent> {
        self.state.lock().unwrap().intents.get(id).cloned()
    }

    /// The intents that were successfully canceled, in order.
    pub fn canceled(&self) -> Vec<IntentId> {
        self.state.lock().unwrap().canceled.clone()
    }

    fn lookup(&self, id: &IntentId) -> Result<Intent, ProcessorError> {
        let state = self.state.lock().unwrap();
        if state.unreachable.contains(id) {
            return Err(ProcessorError::Transport("connection reset by peer".into()));
        }
        state.intents.get(id).cloned().ok_or_else(|| ProcessorError::Api {
            status: 404,
            code: Some("resource_missing".into()),
            message: format!("No such payment_intent: '{id}'"),
        })
    }
}

impl PaymentProcessor for FakeProcessor {
    async fn create_intent(
        &self,
        amount: MinorUnits,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Intent, ProcessorError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = IntentId::new(format!("pi_fake_{:04}", state.next_id));
        let intent = Intent {
            client_secret: Some(format!("{id}_secret")),
            id: id.clone(),
            status: IntentStatus::RequiresPaymentMethod,
            amount,
            currency: currency.to_lowercase(),
            metadata,
        };
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn get_intent(&self, intent_id: &IntentId) -> Result<Intent, ProcessorError> {
        self.lookup(intent_id)
    }

    async fn cancel_intent(&self, intent_id: &IntentId) -> Result<Intent, ProcessorError> {
        self.lookup(intent_id)?;
        let mut state = self.state.lock().unwrap();
        let behaviour = state.cancel_behaviour.get(intent_id).copied().unwrap_or(CancelBehaviour::Cancel);
        match behaviour {
            CancelBehaviour::Cancel => {
                state.canceled.push(intent_id.clone());
                let intent = state.intents.get_mut(intent_id).expect("intent was just looked up");
                intent.status = IntentStatus::Canceled;
                Ok(intent.clone())
            },
            CancelBehaviour::UnexpectedState => Err(ProcessorError::UnexpectedState(format!(
                "{UNEXPECTED_STATE_CODE}: You cannot cancel this PaymentIntent because it has a status of succeeded."
            ))),
            CancelBehaviour::Fail => Err(ProcessorError::RateLimited),
        }
    }

    async fn update_intent_metadata(
        &self,
        intent_id: &IntentId,
        metadata: HashMap<String, String>,
    ) -> Result<Intent, ProcessorError> {
        self.lookup(intent_id)?;
        let mut state = self.state.lock().unwrap();
        let intent = state.intents.get_mut(intent_id).expect("intent was just looked up");
        intent.metadata = metadata;
        Ok(intent.clone())
    }

    async fn resolve_wallet_type(&self, intent_id: &IntentId) -> Option<String> {
        self.state.lock().unwrap().wallets.get(intent_id).cloned()
    }
}

//--------------------------------------  RecordingDispatcher  ---------------------------------------------------------
/// Keeps every dispatched job instead of delivering it.
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    jobs: Arc<Mutex<Vec<CallbackJob>>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<CallbackJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

impl CallbackDispatch for RecordingDispatcher {
    async fn dispatch(&self, job: CallbackJob) {
        self.jobs.lock().unwrap().push(job);
    }
}

//--------------------------------------     FakeTransport     ---------------------------------------------------------
/// Answers deliveries from a script of HTTP status codes. Once the script runs out, every delivery gets
/// `default_status`.
#[derive(Clone)]
pub struct FakeTransport {
    script: Arc<Mutex<VecDeque<u16>>>,
    delivered: Arc<Mutex<Vec<String>>>,
    default_status: u16,
}

impl FakeTransport {
    pub fn always(status: u16) -> Self {
        Self { script: Arc::default(), delivered: Arc::default(), default_status: status }
    }

    pub fn scripted(statuses: &[u16], then: u16) -> Self {
        let transport = Self::always(then);
        transport.script.lock().unwrap().extend(statuses.iter().copied());
        transport
    }

    /// The target URLs of every attempted delivery.
    pub fn attempts(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

impl CallbackTransport for FakeTransport {
    async fn deliver(&self, job: &CallbackJob) -> Result<(), DeliveryError> {
        self.delivered.lock().unwrap().push(job.target_url());
        let status = self.script.lock().unwrap().pop_front().unwrap_or(self.default_status);
        match status {
            0 => Err(DeliveryError::Transport { method: job.method.to_string(), reason: "connection refused".into() }),
            200..=299 => Ok(()),
            _ => Err(DeliveryError::Rejected { method: job.method.to_string(), status }),
        }
    }
}

//--------------------------------------    UnavailableQueue   ---------------------------------------------------------
/// A callback queue whose backing store is down.
#[derive(Clone, Default)]
pub struct UnavailableQueue;

impl UnavailableQueue {
    fn down<T>() -> Result<T, QueueError> {
        Err(QueueError::Unavailable("connection refused".into()))
    }
}

impl CallbackQueue for UnavailableQueue {
    async fn enqueue(&self, _job: &CallbackJob, _policy: &RetryPolicy) -> Result<i64, QueueError> {
        Self::down()
    }

    async fn claim_due(&self, _limit: u32, _visibility: Duration) -> Result<Vec<QueuedJob>, QueueError> {
        Self::down()
    }

    async fn mark_completed(&self, _id: i64) -> Result<(), QueueError> {
        Self::down()
    }

    async fn mark_failed(&self, _id: i64, _error: &str, _policy: &RetryPolicy) -> Result<FailureOutcome, QueueError> {
        Self::down()
    }

    async fn prune(&self, _retention: &RetentionPolicy) -> Result<u64, QueueError> {
        Self::down()
    }

    async fn fetch_job(&self, _id: i64) -> Result<Option<QueuedJob>, QueueError> {
        Self::down()
    }
}
