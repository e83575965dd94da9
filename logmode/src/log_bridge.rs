use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use logmode_core::{Field, Level};

use crate::DISPATCH;

/// Forwards `log` records to the pipeline installed for their level.
struct LogModeLogger;

/// Diagnostics of the engine itself are kept out of the pipelines it is
/// busy replacing.
fn is_internal(target: &str) -> bool {
    target.starts_with("logmode")
}

impl Log for LogModeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        is_internal(metadata.target()) || DISPATCH.is_enabled(metadata.level().into())
    }

    fn log(&self, record: &Record) {
        if is_internal(record.target()) {
            if record.level() <= log::Level::Warn {
                eprintln!("logmode: {}", record.args());
            }
            return;
        }
        let level = Level::from(record.level());
        let func = DISPATCH.current(level);
        if func.is_noop() {
            return;
        }
        let fields = [
            Field::new("level", level.as_str()),
            Field::new("target", record.target()),
            Field::new("msg", record.args().to_string()),
        ];
        if let Err(err) = func.call(&fields) {
            eprintln!("logmode: {level} record dropped: {err}");
        }
    }

    fn flush(&self) {}
}

/// Routes the `log` macros through the global dispatch table. `Trace`
/// records go to the `Debug` pipeline. Fails if another logger is already
/// installed.
pub fn init_log_bridge() -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(LogModeLogger))?;
    log::set_max_level(LevelFilter::Trace);
    Ok(())
}
