use std::time::Duration;

use crate::traits::PaymentGatewayError;

/// A cluster-wide advisory lock.
///
/// Acquisition never waits: if somebody else holds the lock, `try_acquire` returns `false` straight away. Locks are
/// leased, so a holder that crashes without releasing only blocks others until the lease runs out.
#[allow(async_fn_in_trait)]
pub trait DistributedLock: Clone {
    /// Tries to take the lock `key` on behalf of `holder` for `lease`. Returns `true` if the lock is now held by
    /// `holder`. Locks are not reentrant, so a second call from the same holder returns `false` until the lock is
    /// released or the lease runs out.
    async fn try_acquire(&self, key: &str, holder: &str, lease: Duration) -> Result<bool, PaymentGatewayError>;

    /// Releases the lock, if `holder` still holds it.
    async fn release(&self, key: &str, holder: &str) -> Result<(), PaymentGatewayError>;
}
