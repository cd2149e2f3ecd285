//! Logger setup
//!
//! Logs go to stdout with coloured level tags and to the session's log file
//! as plain text. Every line is stamped with the seconds elapsed since the
//! session epoch. A global minimum level applies to all modules, and
//! individual module paths can be given their own level, for instance to see
//! the controller's per-tick trace without the simulation's debug output:
//!
//! ```text
//! --log-module steer_lib::steer_ctrl=trace --log-module steer_lib::sim=warn
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::fmt;
use std::str::FromStr;
use log::{self, info, Level, Record};
use fern::{Dispatch, FormatCallback};
use colored::{ColoredString, Colorize};
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Log level for every module under a module path.
///
/// Parsed from `path=level`, for example `steer_lib::steer_ctrl=trace`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLevel {
    pub module: String,
    pub level: LevelFilter
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of at least `INFO`, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Expected a module level of the form `path=level`, found `{0}`")]
    InvalidModuleLevel(String),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FromStr for ModuleLevel {
    type Err = LoggerInitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LoggerInitError::InvalidModuleLevel(s.to_string());

        let mut parts = s.splitn(2, '=');
        let module = parts.next().map(str::trim).unwrap_or("");
        let level = parts.next().ok_or_else(invalid)?;

        if module.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            module: module.to_string(),
            level: level.trim().parse().map_err(|_| invalid())?
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// # Notes
///
/// - `min_level` must be at least as verbose as `log::Level::Info`. Module
///   levels may be quieter or more verbose than `min_level`.
///
/// # Safety
///
/// - This function must only be called once to prevent corrupting logs.
pub fn logger_init(
    min_level: LevelFilter,
    modules: &[ModuleLevel],
    session: &Session
) -> Result<(), LoggerInitError> {
    check_min_level(min_level)?;

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFileInitError)?;

    levels_dispatch(min_level, modules)
        .chain(Dispatch::new()
            .format(|out, message, record| format_line(out, message, record, true))
            .chain(std::io::stdout()))
        .chain(Dispatch::new()
            .format(|out, message, record| format_line(out, message, record, false))
            .chain(log_file))
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    if let Some(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log level: {:?}", min_level);
    for m in modules {
        info!("    Log level for {}: {:?}", m.module, m.level);
    }
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn check_min_level(min_level: LevelFilter) -> Result<(), LoggerInitError> {
    if min_level < Level::Info {
        Err(LoggerInitError::InvalidMinLogLevel(min_level))
    }
    else {
        Ok(())
    }
}

/// Root dispatch carrying the global and per-module levels, with no outputs.
fn levels_dispatch(min_level: LevelFilter, modules: &[ModuleLevel]) -> Dispatch {
    modules
        .iter()
        .fold(Dispatch::new().level(min_level), |d, m| d.level_for(m.module.clone(), m.level))
}

/// Format one line. Debug and trace lines also name the module they came
/// from.
fn format_line(out: FormatCallback, message: &fmt::Arguments, record: &Record, coloured: bool) {
    let elapsed = session::get_elapsed_seconds();
    let tag: ColoredString = if coloured {
        level_to_str(record.level())
    }
    else {
        level_tag(record.level()).normal()
    };

    if record.level() > Level::Info {
        out.finish(format_args!("[{:10.6} {}] {}: {}", elapsed, tag, record.target(), message))
    }
    else {
        out.finish(format_args!("[{:10.6} {}] {}", elapsed, tag, message))
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRC",
        Level::Debug => "DBG",
        Level::Info => "INF",
        Level::Warn => "WRN",
        Level::Error => "ERR"
    }
}

/// Get the coloured representation of a log level
fn level_to_str(level: Level) -> ColoredString {
    let tag = level_tag(level);
    match level {
        Level::Trace => tag.dimmed().italic(),
        Level::Debug => tag.dimmed(),
        Level::Info => tag.normal(),
        Level::Warn => tag.yellow(),
        Level::Error => tag.red().bold()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
