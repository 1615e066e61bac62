//! Store operation timeout helpers
//!
//! Bounds store calls so a hung backend cannot stall the persistence worker.

use super::{StoreError, StoreResult};
use std::time::Duration;
use tokio::time::timeout;

/// Default timeout for a single store write (5 seconds)
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Execute a store operation with a timeout
///
/// # Arguments
///
/// * `duration` - Timeout duration
/// * `future` - Store operation to execute
///
/// # Returns
///
/// * `StoreResult<T>` - Result or `StoreError::Timeout`
///
/// # Example
///
/// ```no_run
/// use pocket_casino::store::{MemoryStore, StateKey, StateStore, timeouts::{with_timeout, DEFAULT_WRITE_TIMEOUT}};
/// # async fn example() -> Result<(), pocket_casino::store::StoreError> {
/// let store = MemoryStore::new();
/// let balance = with_timeout(DEFAULT_WRITE_TIMEOUT, store.load(StateKey::Balance)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> StoreResult<T>
where
    F: std::future::Future<Output = StoreResult<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(duration)),
    }
}
