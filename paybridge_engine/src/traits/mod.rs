//! # Storage contracts
//!
//! This module defines the interfaces that a storage *backend* must provide for the payment engine to work.
//!
//! ## Payments and the event ledger
//! The [`PaymentGatewayDatabase`] trait owns the payment records and the idempotency ledger. Every state transition
//! triggered by a processor event is applied through [`PaymentGatewayDatabase::settle_intent`] or
//! [`PaymentGatewayDatabase::cancel_pending_intent`], which write the ledger entry and the payment mutation in a single
//! atomic unit.
//!
//! ## Traits
//! * [`PaymentGatewayDatabase`] payment records, the processed-event ledger and the dead-letter ledger.
//! * [`OwnerManagement`] the accounts that payments are collected for, and their partner URLs.
//! * [`CallbackQueue`] a durable, retrying queue of partner notifications.
//! * [`DistributedLock`] a non-blocking, lease-based lock used to keep the reconciliation sweep single-flight.
mod callback_queue;
mod data_objects;
mod distributed_lock;
mod owner_management;
mod payment_gateway_database;

pub use callback_queue::{CallbackQueue, QueueError};
pub use data_objects::{
    FailureOutcome,
    IntentSettlement,
    JobState,
    NewDeadLetter,
    QueuedJob,
    SettlementOutcome,
    TransitionResult,
};
pub use distributed_lock::DistributedLock;
pub use owner_management::OwnerManagement;
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};
