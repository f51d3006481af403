//! Deadlines for external calls.
//!
//! Every Kubernetes and provisioning-system call made by the reconciler is
//! bounded. An elapsed deadline becomes [`Error::Transient`], so the event is
//! retried by the next watch delivery or resync rather than internally.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::Error;

/// Run `operation` with a deadline, converting its error into [`Error`].
pub async fn with_deadline<F, T, E>(timeout: Duration, operation_name: &str, operation: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, E>>,
    E: Into<Error>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            warn!(operation = operation_name, timeout = ?timeout, "External call exceeded deadline");
            Err(Error::transient(
                operation_name,
                format!("deadline of {}s elapsed", timeout.as_secs()),
            ))
        }
    }
}
