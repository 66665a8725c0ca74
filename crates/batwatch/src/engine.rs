use std::time::Duration;

use tracing::{debug, info, warn};

use crate::alert::{AlertKind, Alerts};
use crate::config::MonitorConfig;
use crate::power::{ChargingState, PowerSource};
use crate::shutdown::ShutdownCtl;
use crate::sign::SignCtl;
use crate::sleep::Sleeper;

pub const MSG_LOW: &str = "LOW BATTERY!";
pub const MSG_CHARGED: &str = "Battery charged";
pub const MSG_WARNING: &str = "Battery monitor: check failed";

/// How long a transient warning sign stays up.
const TRANSIENT_SECS: u64 = 5;
/// Seconds of accumulated low-battery warnings before shutdown begins.
const SAFETY_THRESHOLD_SECS: u64 = 60;

/// Escalation bookkeeping carried between ticks. Owned and mutated
/// only by the engine task; the shutdown-active and sign-active flags
/// live inside their controllers.
#[derive(Debug)]
struct EscalationState {
    prev: ChargingState,
    warns: u32,
}

/// The polling state machine. Reads one charging state per tick and
/// re-evaluates the whole policy against (previous, current).
pub struct Engine<P: PowerSource> {
    poll_period: Duration,
    power: P,
    sign: SignCtl,
    alerts: Alerts,
    shutdown: ShutdownCtl,
    state: EscalationState,
}

impl<P: PowerSource> Engine<P> {
    pub fn new(
        cfg: &MonitorConfig,
        power: P,
        sign: SignCtl,
        alerts: Alerts,
        shutdown: ShutdownCtl,
    ) -> Self {
        Self {
            poll_period: cfg.poll_period,
            power,
            sign,
            alerts,
            shutdown,
            state: EscalationState {
                prev: ChargingState::Invalid,
                warns: 0,
            },
        }
    }

    /// Poll until the sleeper's token is cancelled.
    pub async fn run(&mut self, sleeper: Sleeper) {
        info!(period = ?self.poll_period, "battery monitor running");
        loop {
            self.tick().await;
            sleeper.sleep(self.poll_period).await;
            if sleeper.is_cancelled() {
                info!("battery monitor stopping");
                return;
            }
        }
    }

    async fn tick(&mut self) {
        let cur = self.power.charging_state();
        match cur {
            ChargingState::Discharging => self.on_discharging().await,
            ChargingState::Charged => {
                self.sign.show(MSG_CHARGED).await;
                self.state.warns = 0;
                self.shutdown.stop();
            }
            ChargingState::Charging => {
                self.sign.hide().await;
                self.state.warns = 0;
                self.shutdown.stop();
            }
            ChargingState::NoBattery => {
                self.sign.hide().await;
                self.state.warns = 0;
                self.shutdown.stop();
                warn!("battery not present");
            }
            ChargingState::Invalid => {
                self.sign.hide().await;
                self.state.warns = 0;
                self.shutdown.stop();
                warn!("unable to read charging state");
                self.transient_warning().await;
            }
            ChargingState::Other => {
                warn!("unknown charging state");
                self.transient_warning().await;
            }
        }
        self.state.prev = cur;
    }

    async fn on_discharging(&mut self) {
        // Leaving another state: remove whatever sign it put up.
        if self.state.prev != ChargingState::Discharging {
            self.sign.hide().await;
        }

        let low_limit = match self.power.design_capacity_low() {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "unable to read low capacity limit");
                self.transient_warning().await;
                return;
            }
        };
        let remaining = match self.power.remaining_capacity() {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "unable to read remaining capacity");
                self.transient_warning().await;
                return;
            }
        };
        let rate = self.power.present_rate().ok();
        debug!(
            remaining,
            low_limit,
            rate = ?rate,
            warns = self.state.warns,
            "discharging"
        );

        if remaining < low_limit {
            self.sign.show(MSG_LOW).await;
            let accumulated = self.poll_period * self.state.warns;
            if accumulated >= Duration::from_secs(SAFETY_THRESHOLD_SECS)
                && !self.shutdown.is_active()
            {
                self.shutdown.start();
            } else {
                self.state.warns += 1;
                self.alerts.emit(AlertKind::LowBattery);
            }
        } else {
            // Condition cleared: drop the low sign, leave the counter.
            self.sign.hide_if(MSG_LOW).await;
        }
    }

    async fn transient_warning(&self) {
        self.sign
            .show_transient(MSG_WARNING, Duration::from_secs(TRANSIENT_SECS))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertError, AlertSink};
    use crate::power::ReadError;
    use crate::shutdown::CommandRunner;
    use crate::sign::{SignBackend, SignError};
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    struct ScriptedPower {
        states: Mutex<VecDeque<ChargingState>>,
        fallback: ChargingState,
        limit: Mutex<Option<i64>>,
        remaining: Mutex<Option<i64>>,
        rate_reads: Mutex<usize>,
    }

    impl ScriptedPower {
        fn repeating(state: ChargingState) -> Self {
            Self {
                states: Mutex::new(VecDeque::new()),
                fallback: state,
                limit: Mutex::new(Some(20)),
                remaining: Mutex::new(Some(10)),
                rate_reads: Mutex::new(0),
            }
        }

        fn sequence(states: &[ChargingState], fallback: ChargingState) -> Self {
            Self {
                states: Mutex::new(states.iter().copied().collect()),
                fallback,
                limit: Mutex::new(Some(20)),
                remaining: Mutex::new(Some(10)),
                rate_reads: Mutex::new(0),
            }
        }
    }

    impl PowerSource for Arc<ScriptedPower> {
        fn charging_state(&self) -> ChargingState {
            self.states
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.fallback)
        }

        fn design_capacity_low(&self) -> Result<i64, ReadError> {
            self.limit
                .lock()
                .unwrap()
                .ok_or(ReadError::MissingField("design capacity low"))
        }

        fn remaining_capacity(&self) -> Result<i64, ReadError> {
            self.remaining
                .lock()
                .unwrap()
                .ok_or(ReadError::MissingField("remaining capacity"))
        }

        fn present_rate(&self) -> Result<i64, ReadError> {
            *self.rate_reads.lock().unwrap() += 1;
            Ok(1042)
        }
    }

    struct IdleBackend;

    impl SignBackend for IdleBackend {
        fn run(&self, _label: &'static str, stop: CancellationToken) -> Result<(), SignError> {
            while !stop.is_cancelled() {
                std::thread::sleep(Duration::from_millis(2));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        played: Mutex<Vec<PathBuf>>,
    }

    impl AlertSink for RecordingSink {
        fn play(&self, path: &Path) -> Result<(), AlertError> {
            self.played.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingRunner {
        launched: Mutex<Vec<String>>,
    }

    impl CommandRunner for RecordingRunner {
        fn launch(&self, cmdline: String) {
            self.launched.lock().unwrap().push(cmdline);
        }
    }

    struct Harness {
        engine: Engine<Arc<ScriptedPower>>,
        power: Arc<ScriptedPower>,
        sink: Arc<RecordingSink>,
        runner: Arc<RecordingRunner>,
    }

    fn harness(power: ScriptedPower, poll_secs: u64) -> Harness {
        let cfg = MonitorConfig {
            low_battery_sound: "/s/low.wav".into(),
            shutdown_start_sound: "/s/start.wav".into(),
            shutdown_stop_sound: "/s/stop.wav".into(),
            font: "fixed".into(),
            shutdown_command: "/sbin/shutdown".into(),
            poll_period: Duration::from_secs(poll_secs),
        };
        let power = Arc::new(power);
        let sink = Arc::new(RecordingSink::default());
        let runner = Arc::new(RecordingRunner::default());
        let alerts = Alerts::new(sink.clone(), &cfg);
        let sign = SignCtl::new(Arc::new(IdleBackend));
        let shutdown = ShutdownCtl::new(
            cfg.shutdown_command.clone(),
            runner.clone(),
            alerts.clone(),
        );
        let engine = Engine::new(&cfg, power.clone(), sign, alerts, shutdown);
        Harness {
            engine,
            power,
            sink,
            runner,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn low_alerts(sink: &RecordingSink) -> usize {
        sink.played
            .lock()
            .unwrap()
            .iter()
            .filter(|p| *p == &PathBuf::from("/s/low.wav"))
            .count()
    }

    #[tokio::test]
    async fn counter_increments_once_per_qualifying_tick() {
        let mut h = harness(ScriptedPower::repeating(ChargingState::Discharging), 20);
        for expected in 1..=3u32 {
            h.engine.tick().await;
            assert_eq!(h.engine.state.warns, expected);
        }
        settle().await;
        assert_eq!(low_alerts(&h.sink), 3);
        assert_eq!(h.engine.sign.active_label().await, Some(MSG_LOW));
    }

    #[tokio::test]
    async fn counter_resets_on_any_non_discharging_tick() {
        for interloper in [
            ChargingState::Charging,
            ChargingState::Charged,
            ChargingState::NoBattery,
            ChargingState::Invalid,
        ] {
            let mut h = harness(
                ScriptedPower::sequence(
                    &[ChargingState::Discharging, interloper],
                    ChargingState::Discharging,
                ),
                20,
            );
            h.engine.tick().await;
            assert_eq!(h.engine.state.warns, 1);
            h.engine.tick().await;
            assert_eq!(h.engine.state.warns, 0, "after {interloper:?}");
            // The next qualifying tick behaves like the first one.
            h.engine.tick().await;
            assert_eq!(h.engine.state.warns, 1);
        }
    }

    #[tokio::test]
    async fn shutdown_fires_on_thirteenth_qualifying_tick_at_5s_period() {
        let mut h = harness(ScriptedPower::repeating(ChargingState::Discharging), 5);
        for _ in 0..12 {
            h.engine.tick().await;
        }
        assert!(!h.engine.shutdown.is_active());
        assert_eq!(h.engine.state.warns, 12);

        // 12 × 5s = 60s accumulated, checked before increment.
        h.engine.tick().await;
        settle().await;
        assert!(h.engine.shutdown.is_active());
        assert_eq!(h.engine.state.warns, 12);
        assert_eq!(
            *h.runner.launched.lock().unwrap(),
            vec!["/sbin/shutdown -h +2".to_string()]
        );
        assert_eq!(low_alerts(&h.sink), 12);
    }

    #[tokio::test]
    async fn shutdown_does_not_double_fire() {
        let mut h = harness(ScriptedPower::repeating(ChargingState::Discharging), 20);
        for _ in 0..10 {
            h.engine.tick().await;
        }
        settle().await;
        assert!(h.engine.shutdown.is_active());
        assert_eq!(h.runner.launched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn charged_tick_cancels_shutdown_and_shows_charged() {
        let mut h = harness(
            ScriptedPower::sequence(
                &[
                    ChargingState::Discharging,
                    ChargingState::Discharging,
                    ChargingState::Discharging,
                    ChargingState::Discharging,
                    ChargingState::Charged,
                ],
                ChargingState::Discharging,
            ),
            20,
        );
        // 3 warning ticks, then 3 × 20s ≥ 60s starts the shutdown.
        for _ in 0..4 {
            h.engine.tick().await;
        }
        assert!(h.engine.shutdown.is_active());

        h.engine.tick().await;
        settle().await;
        assert!(!h.engine.shutdown.is_active());
        assert_eq!(h.engine.state.warns, 0);
        assert_eq!(h.engine.sign.active_label().await, Some(MSG_CHARGED));
        assert_eq!(
            *h.runner.launched.lock().unwrap(),
            vec![
                "/sbin/shutdown -h +2".to_string(),
                "/sbin/shutdown -c".to_string(),
            ]
        );

        // Low battery again: the count starts fresh at 1.
        h.engine.tick().await;
        assert_eq!(h.engine.state.warns, 1);
        assert_eq!(h.engine.sign.active_label().await, Some(MSG_LOW));
    }

    #[tokio::test]
    async fn read_failure_shows_transient_and_leaves_counters() {
        let mut h = harness(ScriptedPower::repeating(ChargingState::Discharging), 20);
        h.engine.tick().await;
        assert_eq!(h.engine.state.warns, 1);

        *h.power.limit.lock().unwrap() = None;
        h.engine.tick().await;
        settle().await;

        assert_eq!(h.engine.state.warns, 1);
        assert!(!h.engine.shutdown.is_active());
        assert_eq!(h.engine.state.prev, ChargingState::Discharging);
        assert_eq!(h.engine.sign.active_label().await, Some(MSG_WARNING));
        assert_eq!(low_alerts(&h.sink), 1);

        // Reads recover; the counter continues from where it was.
        *h.power.limit.lock().unwrap() = Some(20);
        h.engine.tick().await;
        assert_eq!(h.engine.state.warns, 2);
    }

    #[tokio::test]
    async fn discharging_tick_reads_the_present_rate() {
        let mut h = harness(
            ScriptedPower::sequence(
                &[ChargingState::Charged, ChargingState::Discharging],
                ChargingState::Discharging,
            ),
            20,
        );
        h.engine.tick().await;
        // The rate only matters for the discharging log line.
        assert_eq!(*h.power.rate_reads.lock().unwrap(), 0);

        h.engine.tick().await;
        assert_eq!(*h.power.rate_reads.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn remaining_capacity_read_failure_is_also_transient() {
        let mut h = harness(ScriptedPower::repeating(ChargingState::Discharging), 20);
        *h.power.remaining.lock().unwrap() = None;
        h.engine.tick().await;
        settle().await;
        assert_eq!(h.engine.state.warns, 0);
        assert_eq!(h.engine.sign.active_label().await, Some(MSG_WARNING));
        assert_eq!(low_alerts(&h.sink), 0);
    }

    #[tokio::test]
    async fn recovered_capacity_clears_low_sign_only() {
        let mut h = harness(ScriptedPower::repeating(ChargingState::Discharging), 20);
        h.engine.tick().await;
        h.engine.tick().await;
        assert_eq!(h.engine.sign.active_label().await, Some(MSG_LOW));
        assert_eq!(h.engine.state.warns, 2);

        *h.power.remaining.lock().unwrap() = Some(50);
        h.engine.tick().await;
        assert_eq!(h.engine.sign.active_label().await, None);
        assert_eq!(h.engine.state.warns, 2);
    }

    #[tokio::test]
    async fn entering_discharging_hides_previous_sign() {
        let mut h = harness(
            ScriptedPower::sequence(
                &[ChargingState::Charged, ChargingState::Discharging],
                ChargingState::Discharging,
            ),
            20,
        );
        *h.power.remaining.lock().unwrap() = Some(50);

        h.engine.tick().await;
        assert_eq!(h.engine.sign.active_label().await, Some(MSG_CHARGED));

        h.engine.tick().await;
        assert_eq!(h.engine.sign.active_label().await, None);
    }

    #[tokio::test]
    async fn invalid_tick_resets_and_warns_transiently() {
        let mut h = harness(
            ScriptedPower::sequence(
                &[ChargingState::Discharging, ChargingState::Invalid],
                ChargingState::Discharging,
            ),
            20,
        );
        h.engine.tick().await;
        h.engine.tick().await;
        settle().await;
        assert_eq!(h.engine.state.warns, 0);
        assert_eq!(h.engine.sign.active_label().await, Some(MSG_WARNING));
        assert_eq!(h.engine.state.prev, ChargingState::Invalid);
    }

    #[tokio::test]
    async fn unknown_state_changes_nothing_but_the_sign() {
        let mut h = harness(
            ScriptedPower::sequence(
                &[ChargingState::Discharging, ChargingState::Other],
                ChargingState::Discharging,
            ),
            20,
        );
        h.engine.tick().await;
        assert_eq!(h.engine.state.warns, 1);

        h.engine.tick().await;
        settle().await;
        // An unrecognized value leaves counters and shutdown untouched.
        assert_eq!(h.engine.state.warns, 1);
        assert!(!h.engine.shutdown.is_active());
        assert_eq!(h.engine.sign.active_label().await, Some(MSG_WARNING));
    }

    #[tokio::test]
    async fn no_battery_tick_resets_everything() {
        let mut h = harness(
            ScriptedPower::sequence(
                &[
                    ChargingState::Discharging,
                    ChargingState::Discharging,
                    ChargingState::Discharging,
                    ChargingState::Discharging,
                    ChargingState::NoBattery,
                ],
                ChargingState::NoBattery,
            ),
            20,
        );
        for _ in 0..4 {
            h.engine.tick().await;
        }
        assert!(h.engine.shutdown.is_active());

        h.engine.tick().await;
        assert!(!h.engine.shutdown.is_active());
        assert_eq!(h.engine.state.warns, 0);
        assert_eq!(h.engine.sign.active_label().await, None);
    }

    #[tokio::test]
    async fn run_stops_when_token_cancelled() {
        let mut h = harness(ScriptedPower::repeating(ChargingState::Charging), 20);
        let token = CancellationToken::new();
        token.cancel();
        // One tick, then the cancelled sleeper ends the loop.
        h.engine.run(Sleeper::new(token)).await;
        assert_eq!(h.engine.state.prev, ChargingState::Charging);
    }
}
