//! # logmode
//! Leveled logging whose routing is switched between modes at runtime,
//! e.g. from `SIGUSR1`/`SIGUSR2`/`SIGHUP`, without restarting the process.
//!
//! ## Usage
//! ```toml
//! // Cargo.toml
//! ...
//! [dependencies]
//! logmode = "0.1.0"
//! ```
//!
//! ```rust
//! use logmode::{logger_config, record};
//!
//! let _guard = logger_config()
//!     .with_signal_control(false)
//!     .init_global()
//!     .expect("Unable to initialise logging");
//! logmode::error(&record!["msg" => "Hello, world!"]).unwrap();
//! logmode::debug(&record!["msg" => "dropped until the debug mode is active"]).unwrap();
//! _guard.change_to_mode(2, false, false).unwrap();
//! logmode::debug(&record!["msg" => "now it is written"]).unwrap();
//! ```
//!
//! ## Logging to files
//! The preset writes JSON lines to stdout and, optionally, to a file that is
//! reopened on every reload (`SIGHUP`), so it plays well with log rotation.
//!
//! ```rust
//! use logmode::{logger_config, record};
//!
//! let path = std::env::temp_dir().join("logmode_doc.log");
//! std::fs::remove_file(&path).ok();
//! let guard = logger_config()
//!     .with_log_file(&path)
//!     .no_stdout()
//!     .with_signal_control(false)
//!     .init_global()
//!     .unwrap();
//! logmode::audit(&record!["msg" => "user logged in", "user" => "ada"]).unwrap();
//! drop(guard);
//! assert!(std::fs::read_to_string(&path).unwrap().contains("\"user\":\"ada\""));
//! ```
//!
//! ## Custom modes
//! Any [`Registry`] and mode table can be driven by an [`Engine`]; pass
//! [`dispatch()`] to route the level functions of this crate.

mod filters;
mod log_bridge;
mod serializers;
mod syslog_writers;
mod writers;

use std::{ops::Deref, path::PathBuf, sync::LazyLock};

pub use filters::{IdentityFilter, RedactFilter, TimestampFilter};
pub use log_bridge::init_log_bridge;
pub use logmode_core::{
    BoxError, Collection, ControlSignal, DispatchTable, DisposalError, Engine, Error, Field,
    FilterFn, Filterer, LOGMODE_CONFIG, Level, LevelDispatch, LogFn, ManualSignals, Mode,
    PipelineError, PipelineTuple, Record, Registry, Serializer, SerializerFn, SignalSource,
    ValidationError, Value, Writer, WriterFactory, filter_factory, record, serializer_factory,
    writer_factory,
};
pub use serializers::{ConsoleSerializer, JsonSerializer, LogfmtSerializer};
#[cfg(unix)]
pub use syslog_writers::syslog_writer;
pub use syslog_writers::{SYSLOG_FACILITY, SyslogWriter, tcp_syslog_writer, udp_syslog_writer};
use thiserror::Error;
pub use writers::{
    FileWriter, LimitWriter, MultiWriter, RecordSeparatorWriter, StderrWriter, StdoutWriter,
    SyncWriter, file_writer, limit_writer, multi_writer, record_separator_writer, stderr_writer,
    stdout_writer,
};

/// Level functions of the process, swapped by whichever engine was built
/// with [`dispatch()`].
static DISPATCH: LazyLock<DispatchTable> = LazyLock::new(DispatchTable::new);

/// The process-wide dispatch table used by [`debug`], [`info`], [`warn`],
/// [`error`], [`audit`] and the `log` bridge.
pub fn dispatch() -> &'static DispatchTable {
    &DISPATCH
}

/// Runs the pipeline installed for `level`. Inactive levels return `Ok`.
pub fn log(level: Level, record: &[Field]) -> Result<(), PipelineError> {
    DISPATCH.log(level, record)
}

pub fn debug(record: &[Field]) -> Result<(), PipelineError> {
    log(Level::Debug, record)
}

pub fn info(record: &[Field]) -> Result<(), PipelineError> {
    log(Level::Info, record)
}

pub fn warn(record: &[Field]) -> Result<(), PipelineError> {
    log(Level::Warn, record)
}

pub fn error(record: &[Field]) -> Result<(), PipelineError> {
    log(Level::Error, record)
}

pub fn audit(record: &[Field]) -> Result<(), PipelineError> {
    log(Level::Audit, record)
}

/// Whether the active mode routes `level` anywhere.
pub fn enabled(level: Level) -> bool {
    DISPATCH.is_enabled(level)
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("no log destination: stdout and the log file are both disabled")]
    NoDestination,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Engine(#[from] Error),
}

/// Guard that turns signal control off when dropped.
/// Hold this guard for the lifetime of your logging session.
pub struct EngineGuard {
    engine: Engine,
}

impl Deref for EngineGuard {
    type Target = Engine;
    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

impl Drop for EngineGuard {
    fn drop(&mut self) {
        self.engine.signal_control_off();
    }
}

/// Modes of the preset, all routed through one filter, serializer and
/// writer:
///
/// 0. error, warn and audit
/// 1. audit only
/// 2. every level
pub fn preset_modes() -> Vec<Mode> {
    let route = [PipelineTuple::new(0, 0, 0)];
    vec![
        Mode::new()
            .route(Level::Error, route)
            .route(Level::Warn, route)
            .route(Level::Audit, route),
        Mode::new().route(Level::Audit, route),
        Mode::new()
            .route(Level::Error, route)
            .route(Level::Warn, route)
            .route(Level::Debug, route)
            .route(Level::Info, route)
            .route(Level::Audit, route),
    ]
}

/// Builder for the preset configuration.
pub struct ConfigBuilder {
    log_file: Option<PathBuf>,
    no_stdout: bool,
    signal_control: bool,
    initial_mode: usize,
    recreate_on_shift: bool,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            log_file: None,
            no_stdout: false,
            signal_control: LOGMODE_CONFIG.SIGNAL_CONTROL,
            initial_mode: LOGMODE_CONFIG.INITIAL_MODE,
            recreate_on_shift: true,
        }
    }
}

impl ConfigBuilder {
    fn registry(&self) -> Result<Registry, InitError> {
        let writer = match (&self.log_file, self.no_stdout) {
            (None, true) => return Err(InitError::NoDestination),
            (None, false) => stdout_writer(),
            (Some(path), true) => file_writer(path),
            (Some(path), false) => multi_writer(vec![stdout_writer(), file_writer(path)]),
        };
        Ok(Registry::new()
            .with_filter(|| Ok(TimestampFilter::default()))
            .with_serializer(|| Ok(JsonSerializer))
            .with_writer_factory(writer))
    }

    /// Sets a log file.
    pub fn with_log_file<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            log_file: Some(path.into()),
            ..self
        }
    }
    /// Maybe sets a log file.
    pub fn maybe_with_log_file<P: Into<PathBuf>>(self, path: Option<P>) -> Self {
        Self {
            log_file: path.map(Into::into),
            ..self
        }
    }
    /// Ignore stdout logging
    pub fn no_stdout(self) -> Self {
        Self {
            no_stdout: true,
            ..self
        }
    }
    /// Dynamically set the stdout flag.
    pub fn with_stdout(self, yes: bool) -> Self {
        Self {
            no_stdout: !yes,
            ..self
        }
    }
    /// Listen for `SIGUSR1`, `SIGUSR2` and `SIGHUP` (unix only).
    pub fn with_signal_control(self, yes: bool) -> Self {
        Self {
            signal_control: yes,
            ..self
        }
    }
    /// Mode applied at initialisation.
    pub fn with_initial_mode(self, mode: usize) -> Self {
        Self {
            initial_mode: mode,
            ..self
        }
    }
    /// Rebuild the file handle on every mode change instead of reusing it.
    pub fn recreate_on_shift(self, yes: bool) -> Self {
        Self {
            recreate_on_shift: yes,
            ..self
        }
    }
    /// Builds the preset engine on `dispatch` and applies the initial mode.
    /// Signal control is left off.
    pub fn build_engine<D: LevelDispatch + 'static>(
        &self,
        dispatch: D,
    ) -> Result<Engine, InitError> {
        let engine = Engine::new(
            &self.registry()?,
            &preset_modes(),
            self.recreate_on_shift,
            dispatch,
        )?;
        engine.change_to_mode(self.initial_mode, true, true)?;
        Ok(engine)
    }
    /// Initialize the preset on the process-wide level functions.
    /// Returns a guard that turns signal control off when dropped.
    #[must_use = "EngineGuard must be kept alive to keep signal control. Do \"let _guard = logger_config().init_global()?;\""]
    pub fn init_global(self) -> Result<EngineGuard, InitError> {
        let engine = self.build_engine(dispatch())?;
        if self.signal_control {
            #[cfg(unix)]
            engine.signal_control_on()?;
            #[cfg(not(unix))]
            log::warn!("signal control is only available on unix");
        }
        Ok(EngineGuard { engine })
    }
}

/// Returns a default ConfigBuilder for configuring the logger.
pub fn logger_config() -> ConfigBuilder {
    ConfigBuilder::default()
}
