use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default seconds between power-source polls.
pub const DEFAULT_POLL_SECS: u64 = 20;
const POLL_SECS_MIN: u64 = 1;
const POLL_SECS_MAX: u64 = 3600;

/// Immutable process configuration, built once from argv and passed to
/// the engine and subsystem constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub low_battery_sound: PathBuf,
    pub shutdown_start_sound: PathBuf,
    pub shutdown_stop_sound: PathBuf,
    /// Core X font specifier, in the traditional xlsfonts format.
    pub font: String,
    /// Shutdown command; may carry its own arguments, e.g.
    /// "/usr/bin/sudo /sbin/shutdown".
    pub shutdown_command: String,
    pub poll_period: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("expected 5 or 6 arguments, got {0}")]
    WrongCount(usize),
    #[error("poll period `{0}` is not an integer number of seconds")]
    BadPollPeriod(String),
    #[error("poll period {0}s is outside {POLL_SECS_MIN}..={POLL_SECS_MAX}")]
    PollPeriodRange(u64),
}

impl MonitorConfig {
    /// Parse positional arguments, program name excluded.
    pub fn from_args<I, S>(args: I) -> Result<Self, ArgsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        if args.len() != 5 && args.len() != 6 {
            return Err(ArgsError::WrongCount(args.len()));
        }

        let poll_secs = match args.get(5) {
            None => DEFAULT_POLL_SECS,
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .map_err(|_| ArgsError::BadPollPeriod(raw.clone()))?;
                if !(POLL_SECS_MIN..=POLL_SECS_MAX).contains(&secs) {
                    return Err(ArgsError::PollPeriodRange(secs));
                }
                secs
            }
        };

        Ok(Self {
            low_battery_sound: PathBuf::from(&args[0]),
            shutdown_start_sound: PathBuf::from(&args[1]),
            shutdown_stop_sound: PathBuf::from(&args[2]),
            font: args[3].clone(),
            shutdown_command: args[4].clone(),
            poll_period: Duration::from_secs(poll_secs),
        })
    }
}

pub fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} low_battery_sound start_shutdown_sound stop_shutdown_sound \
         window_font shutdown_command [poll_period_secs]\n\n\
         The window font must be given in the traditional format, as used by\n\
         xlsfonts. The shutdown command is usually '/sbin/shutdown', but it is\n\
         an argument so you can indicate something like\n\
         '/usr/bin/sudo /sbin/shutdown'. The optional poll period is in seconds\n\
         ({POLL_SECS_MIN}..={POLL_SECS_MAX}, default {DEFAULT_POLL_SECS})."
    )
}
