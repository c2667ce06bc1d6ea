//! Async timeout helpers and default durations.
//!
//! Response waits go through [`with_timeout_error`] so that expiry
//! surfaces uniformly as [`ProtocolError::Timeout`]; connect waits map to
//! `ConnectionTimeout` at the call site instead.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// Default bound for connect and request/response waits.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a shutting-down server waits for connections to drain.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a future with a bounded wait, mapping expiry to `ProtocolError::Timeout`.
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}
