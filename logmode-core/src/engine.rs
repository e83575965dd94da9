use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::{
    config::LOGMODE_CONFIG,
    dispatch::LevelDispatch,
    error::{DisposalError, Error, ValidationError},
    level::Level,
    mode::{Mode, validate},
    pipeline::{LogFn, compile},
    registry::{Collection, Registry},
    signal::{SignalController, SignalSource},
    state::{self, ResourceState, Transition},
};

/// Switches the active logging mode and owns the filters, serializers and
/// writers the active mode uses.
///
/// Cloning is cheap; clones drive the same engine. All mode changes are
/// serialized by one lock held for the whole transition, factories and
/// disposal included. Log calls never take that lock.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    modes: Vec<Mode>,
    recreate_on_shift: bool,
    dispatch: Box<dyn LevelDispatch>,
    state: Mutex<State>,
    control: Mutex<SignalController>,
    reports: Sender<DisposalError>,
    reports_rx: Receiver<DisposalError>,
}

struct State {
    current: Option<usize>,
    resources: ResourceState,
}

impl Engine {
    /// Validates `modes` against `registry` and keeps copies of both. No mode
    /// is active afterwards; call [`Engine::change_to_mode`] with `force` to
    /// apply the first one.
    pub fn new<D>(
        registry: &Registry,
        modes: &[Mode],
        recreate_on_shift: bool,
        dispatch: D,
    ) -> Result<Self, ValidationError>
    where
        D: LevelDispatch + 'static,
    {
        validate(registry, modes)?;
        let (reports, reports_rx) = bounded(LOGMODE_CONFIG.DISPOSAL_REPORT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                registry: registry.clone(),
                modes: modes.to_vec(),
                recreate_on_shift,
                dispatch: Box::new(dispatch),
                state: Mutex::new(State {
                    current: None,
                    resources: ResourceState::empty(registry),
                }),
                control: Mutex::new(SignalController::Off),
                reports,
                reports_rx,
            }),
        })
    }

    /// Index of the active mode, `None` before the first transition.
    pub fn current_mode(&self) -> Option<usize> {
        self.lock().current
    }

    pub fn modes(&self) -> &[Mode] {
        &self.inner.modes
    }

    pub fn recreate_on_shift(&self) -> bool {
        self.inner.recreate_on_shift
    }

    /// Changes to `mode`. Does nothing when `mode` is already active unless
    /// `force` is set. With `recreate`, every resource the mode needs is
    /// built again instead of reused.
    pub fn change_to_mode(&self, mode: usize, force: bool, recreate: bool) -> Result<(), Error> {
        let mut state = self.lock();
        self.change_to_locked(&mut state, mode, force, recreate)
    }

    /// Steps to the next mode, wrapping to mode 0 after the last one.
    pub fn next_mode(&self) -> Result<(), Error> {
        let mut state = self.lock();
        let len = self.inner.modes.len();
        let next = state.current.map_or(0, |current| (current + 1) % len);
        self.change_to_locked(&mut state, next, false, self.inner.recreate_on_shift)
    }

    /// Steps to the previous mode, wrapping to the last one before mode 0.
    pub fn prev_mode(&self) -> Result<(), Error> {
        let mut state = self.lock();
        let len = self.inner.modes.len();
        let prev = state.current.map_or(len - 1, |current| (current + len - 1) % len);
        self.change_to_locked(&mut state, prev, false, self.inner.recreate_on_shift)
    }

    /// Changes to mode 0.
    pub fn home_mode(&self) -> Result<(), Error> {
        let mut state = self.lock();
        self.change_to_locked(&mut state, 0, false, self.inner.recreate_on_shift)
    }

    /// Rebuilds every resource of the current mode, e.g. to reopen a log file
    /// that was rotated away. Applies mode 0 when no mode is active yet.
    pub fn reload_mode(&self) -> Result<(), Error> {
        let mut state = self.lock();
        let current = state.current.unwrap_or(0);
        self.change_to_locked(&mut state, current, true, true)
    }

    /// Failures to release dropped resources. At most
    /// `LOGMODE_DISPOSAL_REPORT_CAPACITY` unread reports are queued; while the
    /// queue is full, newer reports are discarded and only logged.
    pub fn disposal_reports(&self) -> Receiver<DisposalError> {
        self.inner.reports_rx.clone()
    }

    /// Listens for `SIGUSR1` (next mode), `SIGUSR2` (home mode) and `SIGHUP`
    /// (reload) on a dedicated thread. Does nothing when already listening.
    #[cfg(unix)]
    pub fn signal_control_on(&self) -> Result<(), Error> {
        self.signal_control_on_with(crate::signal::OsSignals::default())
    }

    /// Like [`Engine::signal_control_on`] with signals from `source`.
    pub fn signal_control_on_with<S>(&self, source: S) -> Result<(), Error>
    where
        S: SignalSource + 'static,
    {
        self.control().enable(self.clone(), Box::new(source))
    }

    /// Stops listening and joins the listener thread. Does nothing when not
    /// listening. Must be called before the engine is dropped if signal
    /// control was turned on.
    ///
    /// With [`OsSignals`](crate::OsSignals), `SIGUSR1`, `SIGUSR2` and `SIGHUP`
    /// remain caught after this returns and are ignored from then on; their
    /// default action is not restored.
    pub fn signal_control_off(&self) {
        self.control().disable()
    }

    pub fn is_signal_control_on(&self) -> bool {
        self.control().is_on()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn control(&self) -> MutexGuard<'_, SignalController> {
        self.inner
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn change_to_locked(
        &self,
        state: &mut State,
        target: usize,
        force: bool,
        recreate: bool,
    ) -> Result<(), Error> {
        let len = self.inner.modes.len();
        if target >= len {
            return Err(Error::ModeOutOfRange { index: target, len });
        }
        if state.current == Some(target) && !force {
            return Ok(());
        }
        let mode = &self.inner.modes[target];
        let Transition { resources, retired } =
            state::plan(
                &self.inner.registry,
                &state.resources,
                mode,
                recreate,
                &self.inner.reports,
            )?;

        for level in Level::ALL {
            let func = match mode.pipeline(level) {
                Some(tuples) => compile(&resources, tuples),
                None => LogFn::noop(),
            };
            self.inner.dispatch.install(level, func);
        }
        log::debug!(
            "log mode {:?} -> {target} ({} filters, {} serializers, {} writers live, {} retired)",
            state.current,
            resources.live(Collection::Filter),
            resources.live(Collection::Serializer),
            resources.live(Collection::Writer),
            retired.len(),
        );
        state.current = Some(target);
        state.resources = resources;
        state::retire(retired, &self.inner.reports);
        Ok(())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.inner.registry)
            .field("modes", &self.inner.modes.len())
            .field("current", &self.current_mode())
            .field("recreate_on_shift", &self.inner.recreate_on_shift)
            .finish()
    }
}
