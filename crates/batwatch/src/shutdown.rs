use std::sync::Arc;

use tracing::warn;

use crate::alert::{AlertKind, Alerts};

/// Grace period handed to the shutdown command, in minutes.
const SHUTDOWN_WAIT_MIN: &str = "2";

/// Launches one shell command line as a detached task.
pub trait CommandRunner: Send + Sync + 'static {
    fn launch(&self, cmdline: String);
}

/// Runs command lines through `/bin/sh -c`, so the configured command
/// may carry its own arguments ("/usr/bin/sudo /sbin/shutdown").
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn launch(&self, cmdline: String) {
        tokio::spawn(async move {
            match tokio::process::Command::new("/bin/sh")
                .arg("-c")
                .arg(&cmdline)
                .status()
                .await
            {
                Ok(status) if !status.success() => {
                    warn!(%cmdline, %status, "shutdown command exited with failure");
                }
                Ok(_) => {}
                Err(e) => warn!(%cmdline, error = %e, "unable to launch shutdown command"),
            }
        });
    }
}

/// Owns the escalation-active flag.
///
/// One start sequence and one stop sequence per transition, each
/// followed by exactly one alert. The flag records intent: a command
/// that fails to launch is logged but never rolls the flag back.
pub struct ShutdownCtl {
    command: String,
    active: bool,
    runner: Arc<dyn CommandRunner>,
    alerts: Alerts,
}

impl ShutdownCtl {
    pub fn new(
        command: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        alerts: Alerts,
    ) -> Self {
        Self {
            command: command.into(),
            active: false,
            runner,
            alerts,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Begin the timed shutdown. No-op while a sequence is active.
    pub fn start(&mut self) {
        if self.active {
            return;
        }
        self.active = true;
        self.runner
            .launch(format!("{} -h +{SHUTDOWN_WAIT_MIN}", self.command));
        self.alerts.emit(AlertKind::ShutdownStart);
    }

    /// Cancel a pending shutdown. No-op when none is active.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.runner.launch(format!("{} -c", self.command));
        self.alerts.emit(AlertKind::ShutdownStop);
    }
}
