use std::sync::{Arc, PoisonError, RwLock};

use crate::{error::PipelineError, level::Level, pipeline::LogFn, record::Field};

/// Receives the function to run for each level whenever the engine changes
/// mode.
pub trait LevelDispatch: Send + Sync {
    fn install(&self, level: Level, func: LogFn);
}

impl<T: LevelDispatch + ?Sized> LevelDispatch for Arc<T> {
    fn install(&self, level: Level, func: LogFn) {
        (**self).install(level, func)
    }
}

impl<T: LevelDispatch + ?Sized> LevelDispatch for &'static T {
    fn install(&self, level: Level, func: LogFn) {
        (**self).install(level, func)
    }
}

/// One swappable [`LogFn`] slot per level.
///
/// A log call clones the slot's function and releases the lock before
/// running it, so calls never wait on a slow writer of another call or on
/// a transition.
pub struct DispatchTable {
    slots: [RwLock<LogFn>; Level::COUNT],
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| RwLock::new(LogFn::noop())),
        }
    }

    pub fn current(&self, level: Level) -> LogFn {
        self.slots[level.index()]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        !self.current(level).is_noop()
    }

    pub fn log(&self, level: Level, fields: &[Field]) -> Result<(), PipelineError> {
        self.current(level).call(fields)
    }
}

impl LevelDispatch for DispatchTable {
    fn install(&self, level: Level, func: LogFn) {
        *self.slots[level.index()]
            .write()
            .unwrap_or_else(PoisonError::into_inner) = func;
    }
}

#[test]
fn test_dispatch_table_swaps_per_level() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let table = DispatchTable::new();
    assert!(Level::ALL.iter().all(|&l| !table.is_enabled(l)));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    table.install(
        Level::Warn,
        LogFn::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    table.log(Level::Warn, &[]).unwrap();
    table.log(Level::Info, &[]).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(table.is_enabled(Level::Warn));
    table.install(Level::Warn, LogFn::noop());
    table.log(Level::Warn, &[]).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
