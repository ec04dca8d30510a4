//!
//! Logger initialization and the logging macros re-exported for the workspace crates.
//!
//! Crates log through the `log` facade using `weave_core::{trace, debug, info, warn, error}`.
//! The process that embeds the pipeline decides where records go by calling [`init_logger`].
//!

use appender::AppenderSpec;
use log4rs::{
    Handle,
    config::{Config, Root},
};
use std::{path::Path, sync::OnceLock};

pub use logger::{FilterSpec, LogError};

mod appender;
mod consts;
mod logger;

pub use consts::DEFAULT_LOGGER_ENV;

const CONSOLE_APPENDER: &str = "stdout";
const LOG_FILE_APPENDER: &str = "log_file";
const ERR_LOG_FILE_APPENDER: &str = "err_log_file";

static LOGGER_HANDLE: OnceLock<Handle> = OnceLock::new();

#[macro_export]
macro_rules! trace {
    ($($t:tt)*) => (
        log::trace!($($t)*)
    )
}

#[macro_export]
macro_rules! debug {
    ($($t:tt)*) => (
        log::debug!($($t)*)
    )
}

#[macro_export]
macro_rules! info {
    ($($t:tt)*) => (
        log::info!($($t)*)
    )
}

#[macro_export]
macro_rules! warn {
    ($($t:tt)*) => (
        log::warn!($($t)*)
    )
}

#[macro_export]
macro_rules! error {
    ($($t:tt)*) => (
        log::error!($($t)*)
    )
}

fn build_config(log_dir: Option<&Path>, filters: &str) -> Result<Config, LogError> {
    let (spec, errors) = FilterSpec::parse(filters);
    for err in errors {
        eprintln!("Ignoring {}", err);
    }

    let mut appenders = vec![AppenderSpec::console(CONSOLE_APPENDER, None)];
    if let Some(log_dir) = log_dir {
        appenders.push(AppenderSpec::roller(LOG_FILE_APPENDER, None, log_dir, consts::LOG_FILE_NAME)?);
        appenders.push(AppenderSpec::roller(
            ERR_LOG_FILE_APPENDER,
            Some(log::LevelFilter::Warn),
            log_dir,
            consts::ERR_LOG_FILE_NAME,
        )?);
    }
    let names = appenders.iter().map(|a| a.name).collect::<Vec<_>>();

    Config::builder()
        .appenders(appenders.into_iter().map(AppenderSpec::appender))
        .loggers(spec.loggers(&names))
        .build(Root::builder().appenders(names.iter().copied()).build(spec.root_level()))
        .map_err(|err| LogError::Init(err.to_string()))
}

/// Installs the global logger, writing to the console and, when `log_dir` is given,
/// to rolling log files in that directory. Calling it again reconfigures the existing logger.
pub fn init_logger(log_dir: Option<&Path>, filters: &str) -> Result<(), LogError> {
    let config = build_config(log_dir, filters)?;
    if let Some(handle) = LOGGER_HANDLE.get() {
        handle.set_config(config);
        return Ok(());
    }
    let handle = log4rs::init_config(config).map_err(|err| LogError::Init(err.to_string()))?;
    // A concurrent initializer may have won the race, in which case its handle is kept
    let _ = LOGGER_HANDLE.set(handle);
    Ok(())
}

/// Console-only logger setup for tests. Failures (e.g. another logger already installed) are ignored.
pub fn try_init_logger(filters: &str) {
    let _ = init_logger(None, filters);
}

/// Initializes from the `RUST_LOG` environment variable, falling back to `default_filters`
pub fn init_logger_from_env(log_dir: Option<&Path>, default_filters: &str) -> Result<(), LogError> {
    let filters = std::env::var(DEFAULT_LOGGER_ENV).unwrap_or_else(|_| default_filters.to_owned());
    init_logger(log_dir, &filters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_appenders_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = build_config(Some(dir.path()), "info,weave_core=trace").unwrap();
        assert_eq!(config.appenders().len(), 3);
        assert_eq!(config.loggers().len(), 1);
        assert_eq!(config.root().level(), log::LevelFilter::Info);
    }

    #[test]
    fn test_console_only() {
        let config = build_config(None, "debug").unwrap();
        assert_eq!(config.appenders().len(), 1);
        assert!(config.loggers().is_empty());
    }
}
