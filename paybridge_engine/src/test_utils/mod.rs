//! Helpers for tests of the payment engine and the crates that build on it.
pub mod fakes;
pub mod prepare_env;

pub use fakes::{CancelBehaviour, FakeProcessor, FakeTransport, RecordingDispatcher, UnavailableQueue};
pub use prepare_env::{prepare_test_env, random_db_path, test_database};
