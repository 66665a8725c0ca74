mod x11;

pub use x11::X11Backend;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("display connection failed: {0}")]
    Connect(String),
    #[error("font `{0}` could not be loaded")]
    Font(String),
    #[error("window setup failed: {0}")]
    Window(String),
}

/// Drives one visible notification surface until told to stop.
///
/// Implementations block the current thread; the controller runs them
/// on the blocking pool. Returning releases the window resource.
pub trait SignBackend: Send + Sync + 'static {
    fn run(&self, label: &'static str, stop: CancellationToken) -> Result<(), SignError>;
}

struct ActiveSign {
    label: &'static str,
    stop: CancellationToken,
    worker: JoinHandle<()>,
}

struct SignInner {
    backend: Arc<dyn SignBackend>,
    active: Option<ActiveSign>,
}

/// Owns the single visible sign, if any.
///
/// At most one `ActiveSign` exists at a time: `show` with a different
/// label and `hide` both wait for the previous worker to exit before
/// anything new is created, so two windows never overlap.
#[derive(Clone)]
pub struct SignCtl {
    inner: Arc<Mutex<SignInner>>,
}

impl SignCtl {
    pub fn new(backend: Arc<dyn SignBackend>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SignInner {
                backend,
                active: None,
            })),
        }
    }

    /// Show `label`. No-op when it is already up; a different active
    /// label is fully torn down first.
    pub async fn show(&self, label: &'static str) {
        let mut inner = self.inner.lock().await;
        if let Some(active) = &inner.active {
            if active.label == label {
                return;
            }
        }
        teardown(&mut inner).await;

        let stop = CancellationToken::new();
        let backend = inner.backend.clone();
        let worker_stop = stop.clone();
        let worker = tokio::task::spawn_blocking(move || {
            if let Err(e) = backend.run(label, worker_stop) {
                warn!(error = %e, label, "sign worker failed");
            }
        });
        inner.active = Some(ActiveSign {
            label,
            stop,
            worker,
        });
    }

    /// Tear down the visible sign, waiting until its window is released.
    pub async fn hide(&self) {
        let mut inner = self.inner.lock().await;
        teardown(&mut inner).await;
    }

    /// `hide`, but only when `label` is still the one showing.
    pub async fn hide_if(&self, label: &'static str) {
        let mut inner = self.inner.lock().await;
        if matches!(&inner.active, Some(a) if a.label == label) {
            teardown(&mut inner).await;
        }
    }

    /// Show `label`, then hide it again after `dur` on an independent
    /// timer — unless something else replaced it in the meantime.
    pub async fn show_transient(&self, label: &'static str, dur: Duration) {
        self.show(label).await;
        let ctl = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(dur).await;
            ctl.hide_if(label).await;
        });
    }

    pub async fn active_label(&self) -> Option<&'static str> {
        self.inner.lock().await.active.as_ref().map(|a| a.label)
    }
}

// The teardown rendezvous: signal the worker, then wait for it to exit.
// A worker that already failed joins immediately.
async fn teardown(inner: &mut SignInner) {
    if let Some(active) = inner.active.take() {
        active.stop.cancel();
        if let Err(e) = active.worker.await {
            warn!(error = %e, "sign worker panicked during teardown");
        }
    }
}
