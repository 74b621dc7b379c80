//! Racing blocking work against the process-wide cancellation token.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Run `work` until it completes or `cancel` fires.
///
/// When the token fires first the future is dropped, which kills any
/// subprocess spawned with `kill_on_drop` and aborts in-flight requests.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] naming `operation` when cancelled, otherwise
/// whatever `work` returns.
pub async fn run<F, T>(cancel: &CancellationToken, operation: &str, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::debug!(operation, "Operation cancelled");
            Err(Error::cancelled(operation))
        }
        result = work => result,
    }
}
