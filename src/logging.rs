//! Process-wide logging setup and verbosity control.
//!
//! The boundary is a flat function surface with no context object, so
//! the log level is explicit process-scoped state: a single atomic word,
//! settable from any thread, read through the `log` facade's max-level
//! on every log call. The process logger itself is installed once, on
//! the first instance creation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

use log::LevelFilter;

use crate::errors::Result;

/// Ordered verbosity levels understood at the boundary.
///
/// The discriminants are the integer codes of the C interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    /// Map a boundary code to a level. Out-of-range codes are rejected.
    pub fn from_code(code: i32) -> Option<LogLevel> {
        match code {
            0 => Some(LogLevel::Debug),
            1 => Some(LogLevel::Info),
            2 => Some(LogLevel::Warn),
            3 => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

static LEVEL: AtomicUsize = AtomicUsize::new(LogLevel::Info as usize);
static INIT: Once = Once::new();

/// Current process-wide level.
pub fn log_level() -> LogLevel {
    match LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Debug,
        1 => LogLevel::Info,
        2 => LogLevel::Warn,
        _ => LogLevel::Error,
    }
}

/// Set the process-wide level. Takes effect on the next log call of
/// every instance; already-running instances are not restarted.
pub fn set_log_level(level: LogLevel) {
    LEVEL.store(level as usize, Ordering::Relaxed);
    log::set_max_level(level.filter());
}

/// Install the process logger. Called by the registry on every instance
/// creation; only the first call does the work. A `debug` instance
/// raises the level before the logger is built.
///
/// A logger already installed by the host application counts as
/// success: log lines have somewhere to go either way.
pub(crate) fn init(debug: bool) -> Result<()> {
    if debug {
        set_log_level(LogLevel::Debug);
    }
    INIT.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(log_level().filter())
            .format_timestamp_millis()
            .try_init();
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..4 {
            assert_eq!(LogLevel::from_code(code).unwrap().code(), code);
        }
        assert_eq!(LogLevel::from_code(-1), None);
        assert_eq!(LogLevel::from_code(4), None);
    }

    #[test]
    fn levels_are_ordered() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn set_level_is_visible() {
        set_log_level(LogLevel::Warn);
        assert_eq!(log_level(), LogLevel::Warn);
        set_log_level(LogLevel::Info);
        assert_eq!(log_level(), LogLevel::Info);
    }
}
