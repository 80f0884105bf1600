/// Injectable time source for the blocking points of an issuing run
/// (safe-mode polling and broadcast backoff).
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{AnchorError, Result};

#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleep on `clock`, returning early with `Cancelled` if `cancel` fires.
pub(crate) async fn sleep_or_cancel(
    clock: &dyn Clock,
    duration: Duration,
    cancel: &CancellationToken,
    during: &str,
) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AnchorError::Cancelled(during.to_string())),
        _ = clock.sleep(duration) => Ok(()),
    }
}
