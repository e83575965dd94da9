use std::{
    io,
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};

use crate::{engine::Engine, error::Error};

/// External requests the signal controller turns into engine calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    /// Step to the next mode (`SIGUSR1`).
    Next,
    /// Go back to mode 0 (`SIGUSR2`).
    Home,
    /// Rebuild every resource of the current mode (`SIGHUP`).
    Reload,
}

/// Where control signals come from. `subscribe` starts delivering into
/// `sink` until `unsubscribe` is called.
pub trait SignalSource: Send {
    fn subscribe(&mut self, sink: Sender<ControlSignal>) -> io::Result<()>;
    fn unsubscribe(&mut self);
}

/// Process signals: `SIGUSR1` → next, `SIGUSR2` → home, `SIGHUP` → reload.
///
/// Unsubscribing stops the forwarding, but the process-level handlers stay
/// installed: afterwards the three signals are ignored instead of taking
/// their default action (terminating the process).
#[cfg(unix)]
#[derive(Default)]
pub struct OsSignals {
    handle: Option<signal_hook::iterator::Handle>,
    forwarder: Option<JoinHandle<()>>,
}

#[cfg(unix)]
impl SignalSource for OsSignals {
    fn subscribe(&mut self, sink: Sender<ControlSignal>) -> io::Result<()> {
        use signal_hook::consts::{SIGHUP, SIGUSR1, SIGUSR2};

        let mut signals = signal_hook::iterator::Signals::new([SIGUSR1, SIGUSR2, SIGHUP])?;
        let handle = signals.handle();
        let forwarder = thread::Builder::new()
            .name("logmode-signals".into())
            .spawn(move || {
                for signal in signals.forever() {
                    let control = match signal {
                        SIGUSR1 => ControlSignal::Next,
                        SIGUSR2 => ControlSignal::Home,
                        SIGHUP => ControlSignal::Reload,
                        _ => continue,
                    };
                    if sink.send(control).is_err() {
                        break;
                    }
                }
            });
        let forwarder = match forwarder {
            Ok(forwarder) => forwarder,
            Err(err) => {
                handle.close();
                return Err(err);
            }
        };
        self.handle = Some(handle);
        self.forwarder = Some(forwarder);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.join().ok();
        }
    }
}

/// Signals raised by the application itself, e.g. from an admin endpoint.
/// Clones share the subscription.
#[derive(Clone, Default)]
pub struct ManualSignals {
    sink: Arc<Mutex<Option<Sender<ControlSignal>>>>,
}

impl ManualSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `signal` to the listener. Returns false when nothing is
    /// subscribed.
    pub fn raise(&self, signal: ControlSignal) -> bool {
        let sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        sink.as_ref().is_some_and(|s| s.send(signal).is_ok())
    }
}

impl SignalSource for ManualSignals {
    fn subscribe(&mut self, sink: Sender<ControlSignal>) -> io::Result<()> {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

pub(crate) struct Listener {
    source: Box<dyn SignalSource>,
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// `Off` until enabled; `On` while a listener thread forwards signals to the
/// engine.
#[derive(Default)]
pub(crate) enum SignalController {
    #[default]
    Off,
    On(Listener),
}

impl SignalController {
    pub(crate) fn is_on(&self) -> bool {
        matches!(self, SignalController::On(_))
    }

    /// Starts listening. Does nothing when already on.
    pub(crate) fn enable(
        &mut self,
        engine: Engine,
        mut source: Box<dyn SignalSource>,
    ) -> Result<(), Error> {
        if self.is_on() {
            log::debug!("signal control already on");
            return Ok(());
        }
        let (sink, signals) = unbounded();
        let (stop, stopped) = bounded(1);
        source.subscribe(sink).map_err(Error::Signal)?;
        let handle = thread::Builder::new()
            .name("logmode-control".into())
            .spawn(move || listen(engine, signals, stopped));
        let handle = match handle {
            Ok(handle) => handle,
            Err(err) => {
                source.unsubscribe();
                return Err(Error::Signal(err));
            }
        };
        *self = SignalController::On(Listener {
            source,
            stop,
            handle,
        });
        Ok(())
    }

    /// Unsubscribes and waits for the listener to exit. Does nothing when off.
    pub(crate) fn disable(&mut self) {
        match std::mem::take(self) {
            SignalController::Off => log::debug!("signal control already off"),
            SignalController::On(Listener {
                mut source,
                stop,
                handle,
            }) => {
                source.unsubscribe();
                stop.send(()).ok();
                if handle.join().is_err() {
                    log::warn!("signal control listener panicked");
                }
            }
        }
    }
}

fn listen(engine: Engine, signals: Receiver<ControlSignal>, stop: Receiver<()>) {
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(signals) -> signal => {
                let Ok(signal) = signal else { break };
                let result = match signal {
                    ControlSignal::Next => engine.next_mode(),
                    ControlSignal::Home => engine.home_mode(),
                    ControlSignal::Reload => engine.reload_mode(),
                };
                if let Err(err) = result {
                    log::warn!("{signal:?} signal could not change log mode: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::{
        dispatch::DispatchTable,
        level::Level,
        mode::Mode,
        registry::Registry,
        testing::{Lifecycle, Recorder, Sink, TaggedSerializer, identity},
    };

    fn engine(lifecycle: &Arc<Lifecycle>) -> Engine {
        let sink = Sink::default();
        let lifecycle = Arc::clone(lifecycle);
        let registry = Registry::new()
            .with_filter(|| Ok(identity()))
            .with_serializer(|| Ok(TaggedSerializer::new("s")))
            .with_writer(move || Ok(Recorder::new(&sink).tracked(&lifecycle)));
        let modes = vec![
            Mode::new().route(Level::Error, [(0, 0, 0)]),
            Mode::new().route(Level::Info, [(0, 0, 0)]),
            Mode::new().route(Level::Debug, [(0, 0, 0)]),
        ];
        Engine::new(&registry, &modes, false, DispatchTable::new()).unwrap()
    }

    fn wait_for(what: &str, cond: impl Fn() -> bool) {
        let start = Instant::now();
        while !cond() {
            assert!(start.elapsed() < Duration::from_secs(5), "timed out: {what}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_manual_signals_drive_transitions() {
        let lifecycle = Arc::default();
        let engine = engine(&lifecycle);
        engine.change_to_mode(0, true, true).unwrap();
        let signals = ManualSignals::new();
        assert!(!signals.raise(ControlSignal::Next));

        engine.signal_control_on_with(signals.clone()).unwrap();
        assert!(engine.is_signal_control_on());

        assert!(signals.raise(ControlSignal::Next));
        wait_for("next", || engine.current_mode() == Some(1));
        assert!(signals.raise(ControlSignal::Next));
        wait_for("next again", || engine.current_mode() == Some(2));
        assert!(signals.raise(ControlSignal::Home));
        wait_for("home", || engine.current_mode() == Some(0));
        assert_eq!(lifecycle.built(), 1);
        assert!(signals.raise(ControlSignal::Reload));
        wait_for("reload", || lifecycle.built() == 2);
        wait_for("reload disposal", || lifecycle.released() == 1);

        engine.signal_control_off();
        assert!(!engine.is_signal_control_on());
        assert!(!signals.raise(ControlSignal::Next));
        assert_eq!(engine.current_mode(), Some(0));
    }

    #[test]
    fn test_enable_twice_and_disable_twice_are_noops() {
        let engine = engine(&Arc::default());
        let first = ManualSignals::new();
        let second = ManualSignals::new();
        engine.signal_control_on_with(first.clone()).unwrap();
        engine.signal_control_on_with(second.clone()).unwrap();
        assert!(!second.raise(ControlSignal::Next));
        engine.signal_control_off();
        engine.signal_control_off();
        assert!(!engine.is_signal_control_on());
        assert!(!first.raise(ControlSignal::Next));
    }

    #[cfg(unix)]
    #[test]
    fn test_os_signal_steps_mode() {
        let engine = engine(&Arc::default());
        engine.change_to_mode(0, true, false).unwrap();
        engine.signal_control_on().unwrap();
        signal_hook::low_level::raise(signal_hook::consts::SIGUSR1).unwrap();
        wait_for("SIGUSR1", || engine.current_mode() == Some(1));
        engine.signal_control_off();

        // still caught after unsubscribing: ignored, not forwarded
        signal_hook::low_level::raise(signal_hook::consts::SIGUSR1).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(engine.current_mode(), Some(1));
    }
}
