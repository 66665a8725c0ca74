use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Best-effort interruptible wait between poll ticks.
///
/// `sleep` returns after the full duration or as soon as the token is
/// cancelled, whichever comes first. Callers treat an early return the
/// same as a completed one.
#[derive(Debug, Clone)]
pub struct Sleeper {
    token: CancellationToken,
}

impl Sleeper {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub async fn sleep(&self, dur: Duration) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep(dur) => {}
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
