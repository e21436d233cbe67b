//! `-v` / `-q` flags controlling how much `reach` logs to stderr.
//!
//! By default only warnings and errors are shown, which includes every
//! retried and every finally failed query.
//! - `-q` shows errors only, `-qq` silences logging
//! - `-v` adds dispatch progress (info)
//! - `-vv` adds every single attempt (debug)
//! - `-vvv` shows everything (trace)

use std::fmt;

use log::LevelFilter;
use serde::Deserialize;

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Verbosity {
    /// Pass many times for more log output
    ///
    /// By default, it'll report warnings and errors. Passing `-v` one time
    /// also prints info messages, `-vv` enables debug logging, `-vvv` trace.
    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet",
    )]
    verbose: u8,

    /// Pass once to only log errors, twice to disable logging
    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "verbose",
    )]
    quiet: u8,
}

impl Verbosity {
    /// Get the log level filter.
    pub(crate) fn log_level_filter(&self) -> LevelFilter {
        level_filter(self.verbosity())
    }

    #[allow(clippy::cast_possible_wrap)]
    const fn verbosity(&self) -> i8 {
        level_value(LevelFilter::Warn) - (self.quiet as i8) + (self.verbose as i8)
    }
}

// Deserialized from a level name like "warn", "warning" or "Debug"
impl<'de> Deserialize<'de> for Verbosity {
    #[allow(clippy::cast_sign_loss)]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let level = match s.to_lowercase().as_str() {
            "off" | "quiet" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            level => {
                return Err(serde::de::Error::custom(format!(
                    "invalid log level `{level}`"
                )))
            }
        };
        let default = level_value(LevelFilter::Warn);
        let value = level_value(level);
        Ok(Verbosity {
            verbose: (value - default).max(0) as u8,
            quiet: (default - value).max(0) as u8,
        })
    }
}

const fn level_value(level: LevelFilter) -> i8 {
    match level {
        LevelFilter::Off => 0,
        LevelFilter::Error => 1,
        LevelFilter::Warn => 2,
        LevelFilter::Info => 3,
        LevelFilter::Debug => 4,
        LevelFilter::Trace => 5,
    }
}

const fn level_filter(verbosity: i8) -> LevelFilter {
    match verbosity {
        i8::MIN..=0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.log_level_filter())
    }
}
