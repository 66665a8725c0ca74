use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::config::MonitorConfig;

/// Which alert sound to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    LowBattery,
    ShutdownStart,
    ShutdownStop,
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("audio device unavailable: {0}")]
    Device(String),
    #[error("cannot open sound file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot decode sound file: {0}")]
    Decode(String),
}

/// Plays one sound file from start to finish, blocking the caller.
pub trait AlertSink: Send + Sync + 'static {
    fn play(&self, path: &Path) -> Result<(), AlertError>;
}

/// Fire-and-forget alert dispatch.
///
/// Each `emit` launches an independent playback task; playbacks may
/// overlap and failures are logged, never surfaced to the caller.
#[derive(Clone)]
pub struct Alerts {
    sink: Arc<dyn AlertSink>,
    low_battery: PathBuf,
    shutdown_start: PathBuf,
    shutdown_stop: PathBuf,
}

impl Alerts {
    pub fn new(sink: Arc<dyn AlertSink>, cfg: &MonitorConfig) -> Self {
        Self {
            sink,
            low_battery: cfg.low_battery_sound.clone(),
            shutdown_start: cfg.shutdown_start_sound.clone(),
            shutdown_stop: cfg.shutdown_stop_sound.clone(),
        }
    }

    pub fn emit(&self, kind: AlertKind) {
        let path = match kind {
            AlertKind::LowBattery => self.low_battery.clone(),
            AlertKind::ShutdownStart => self.shutdown_start.clone(),
            AlertKind::ShutdownStop => self.shutdown_stop.clone(),
        };
        let sink = self.sink.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = sink.play(&path) {
                warn!(error = %e, path = %path.display(), ?kind, "alert playback failed");
            }
        });
    }
}

/// rodio-backed sink. Every playback opens its own output stream, so
/// overlapping alerts never contend on a shared device handle.
pub struct RodioSink;

impl RodioSink {
    /// Open and drop the default output stream once at startup. A
    /// machine without a usable audio device fails here, before the
    /// monitor loop starts.
    pub fn probe() -> Result<(), AlertError> {
        let _stream =
            rodio::OutputStream::try_default().map_err(|e| AlertError::Device(e.to_string()))?;
        Ok(())
    }
}

impl AlertSink for RodioSink {
    fn play(&self, path: &Path) -> Result<(), AlertError> {
        let (_stream, handle) =
            rodio::OutputStream::try_default().map_err(|e| AlertError::Device(e.to_string()))?;
        let sink =
            rodio::Sink::try_new(&handle).map_err(|e| AlertError::Device(e.to_string()))?;
        let file = std::fs::File::open(path)?;
        let source = rodio::Decoder::new(std::io::BufReader::new(file))
            .map_err(|e| AlertError::Decode(e.to_string()))?;
        sink.append(source);
        sink.sleep_until_end();
        Ok(())
    }
}
