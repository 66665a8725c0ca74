mod alert;
mod config;
mod engine;
mod power;
mod shutdown;
mod sign;
mod sleep;

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::alert::{Alerts, RodioSink};
use crate::config::MonitorConfig;
use crate::engine::Engine;
use crate::power::ProcPowerSource;
use crate::shutdown::{ShellRunner, ShutdownCtl};
use crate::sign::{SignCtl, X11Backend};
use crate::sleep::Sleeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut argv = std::env::args();
    let prog = argv.next().unwrap_or_else(|| "batwatch".into());
    let cfg = match MonitorConfig::from_args(argv) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}\n\n{}", config::usage(&prog));
            std::process::exit(1);
        }
    };

    // A machine without a usable audio device cannot alert at all, so
    // fail before the loop starts rather than once per alert.
    RodioSink::probe().map_err(|e| anyhow::anyhow!("audio init failed: {e}"))?;

    let token = CancellationToken::new();
    spawn_signal_listener(token.clone());

    let alerts = Alerts::new(Arc::new(RodioSink), &cfg);
    let sign = SignCtl::new(Arc::new(X11Backend::new(cfg.font.clone())));
    let shutdown = ShutdownCtl::new(
        cfg.shutdown_command.clone(),
        Arc::new(ShellRunner),
        alerts.clone(),
    );

    let mut engine = Engine::new(&cfg, ProcPowerSource::new(), sign, alerts, shutdown);
    engine.run(Sleeper::new(token)).await;
    Ok(())
}

/// Listen for OS signals and cancel the run token, so the poll sleep
/// aborts promptly and the loop exits cleanly.
fn spawn_signal_listener(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to register SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM, stopping"),
                _ = signal::ctrl_c() => tracing::info!("received Ctrl+C, stopping"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = signal::ctrl_c().await;
            tracing::info!("received Ctrl+C, stopping");
        }
        token.cancel();
    });
}
