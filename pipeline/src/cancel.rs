//! Cancellation and pacing around external calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Await `fut` unless `cancel` fires first. `None` means cancelled; the
/// in-flight future is dropped.
pub async fn or_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Sleep for `spacing` before an external call. Returns `false` if cancelled
/// while waiting.
pub async fn pace(cancel: &CancellationToken, spacing: Duration) -> bool {
    if spacing.is_zero() {
        return !cancel.is_cancelled();
    }
    or_cancelled(cancel, tokio::time::sleep(spacing)).await.is_some()
}
