//! File-backed logging for the crew engine.
//!
//! Every line is attributed to a [`Scope`]: the team, worker, or task
//! the component was acting for when it logged. Lines land in
//! `~/.crew/crew.log`, truncated at startup; debug output is switched
//! on with `--debug` or `CREW_DEBUG=1`. Logging never fails the
//! engine: a missing sink or a write error drops the line.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::core::task::TaskId;
use crate::core::team::TeamId;
use crate::orchestration::worker::WorkerId;

static SINK: OnceLock<Mutex<File>> = OnceLock::new();
static MAX_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

/// Severity of a log line, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        f.pad(tag)
    }
}

/// Which engine entity a log line speaks for.
#[derive(Debug, Clone, Copy)]
pub enum Scope {
    /// Component-level lines with no single owning entity.
    Engine,
    Team(TeamId),
    Worker(WorkerId),
    Task(TaskId),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Engine => write!(f, "engine"),
            Scope::Team(id) => write!(f, "team {}", id.short()),
            Scope::Worker(id) => write!(f, "worker {}", id.short()),
            Scope::Task(id) => write!(f, "task {}", id.short()),
        }
    }
}

/// Initialize logging to `~/.crew/crew.log`, truncating any previous
/// run's output.
pub fn init_with_debug(debug: bool) {
    let debug = debug
        || std::env::var("CREW_DEBUG")
            .map(|value| truthy(&value))
            .unwrap_or(false);
    if let Some(home) = dirs::home_dir() {
        let dir = home.join(".crew");
        let _ = std::fs::create_dir_all(&dir);
        init_at(&dir.join("crew.log"), debug);
    }
}

/// Point the sink at an explicit path (embedding and tests).
///
/// Returns false when a sink is already installed or the file cannot
/// be opened; the earlier sink keeps receiving lines in that case.
pub fn init_at(path: &Path, debug: bool) -> bool {
    let max = if debug { Level::Debug } else { Level::Info };
    MAX_LEVEL.store(max as u8, Ordering::SeqCst);
    let file = match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
    {
        Ok(file) => file,
        Err(_) => return false,
    };
    SINK.set(Mutex::new(file)).is_ok()
}

/// Append one line to the sink, if the level passes the filter.
pub fn write(level: Level, scope: Scope, message: fmt::Arguments<'_>) {
    if level as u8 > MAX_LEVEL.load(Ordering::Relaxed) {
        return;
    }
    let sink = match SINK.get() {
        Some(sink) => sink,
        None => return,
    };
    let mut file = sink.lock().unwrap_or_else(PoisonError::into_inner);
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
    let _ = writeln!(file, "[{}] {:5} [{}] {}", timestamp, level, scope, message);
}

fn truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Info-level log line; `scope:` attributes it to an engine entity.
#[macro_export]
macro_rules! clog {
    (scope: $scope:expr, $($arg:tt)*) => {
        $crate::log::write($crate::log::Level::Info, $scope, format_args!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::log::write(
            $crate::log::Level::Info,
            $crate::log::Scope::Engine,
            format_args!($($arg)*),
        )
    };
}

/// Error-level log line; `scope:` attributes it to an engine entity.
#[macro_export]
macro_rules! clog_error {
    (scope: $scope:expr, $($arg:tt)*) => {
        $crate::log::write($crate::log::Level::Error, $scope, format_args!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::log::write(
            $crate::log::Level::Error,
            $crate::log::Scope::Engine,
            format_args!($($arg)*),
        )
    };
}

/// Warn-level log line; `scope:` attributes it to an engine entity.
#[macro_export]
macro_rules! clog_warn {
    (scope: $scope:expr, $($arg:tt)*) => {
        $crate::log::write($crate::log::Level::Warn, $scope, format_args!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::log::write(
            $crate::log::Level::Warn,
            $crate::log::Scope::Engine,
            format_args!($($arg)*),
        )
    };
}

/// Debug-level log line, filtered out unless debug mode is on.
#[macro_export]
macro_rules! clog_debug {
    (scope: $scope:expr, $($arg:tt)*) => {
        $crate::log::write($crate::log::Level::Debug, $scope, format_args!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::log::write(
            $crate::log::Level::Debug,
            $crate::log::Scope::Engine,
            format_args!($($arg)*),
        )
    };
}

/// Trace-level log line for very verbose internals (bus traffic).
#[macro_export]
macro_rules! clog_trace {
    (scope: $scope:expr, $($arg:tt)*) => {
        $crate::log::write($crate::log::Level::Trace, $scope, format_args!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::log::write(
            $crate::log::Level::Trace,
            $crate::log::Scope::Engine,
            format_args!($($arg)*),
        )
    };
}
