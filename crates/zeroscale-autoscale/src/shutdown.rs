//! Cooperative cancellation over a `watch::Receiver<bool>`.
//!
//! A registration stops when its sender publishes `true` or is dropped.

use tokio::sync::watch;

/// Resolves once shutdown has been requested. Returns immediately if it
/// already was.
pub(crate) async fn requested(rx: &mut watch::Receiver<bool>) {
    // Err means the sender is gone, which also ends the registration.
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Non-blocking check used right before acting on a decision.
pub(crate) fn is_requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}
