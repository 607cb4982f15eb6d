//! Background motion worker and the stop coordinator.
//!
//! One worker thread per motion. The worker publishes its final result on a
//! single-slot rendezvous and signals three latches: `started` once the first
//! step has been attempted, `exited` once it will issue no further writes,
//! `observed` once the completion observer has returned.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::{Error, MotionError, Result};
use crate::motion::timing;

use super::emitter::StepEmitter;
use super::interrupt::Subscription;
use super::state::{MotionState, Shared};

/// Completion observer, called once per motion with its final error.
pub(crate) type Observer = Arc<dyn Fn(Option<&Error>) + Send + Sync>;

#[derive(Debug, Default)]
struct Latch {
    released: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    fn release(&self) {
        let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        *released = true;
        self.cond.notify_all();
    }

    /// Returns whether the latch was released within `timeout`.
    fn wait(&self, timeout: Duration) -> bool {
        let released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        let (released, _) = self
            .cond
            .wait_timeout_while(released, timeout, |released| !*released)
            .unwrap_or_else(PoisonError::into_inner);
        *released
    }
}

/// Everything the caller side and the worker thread share.
struct Signals {
    name: heapless::String<32>,
    endless: bool,
    started: Latch,
    exited: Latch,
    observed: Latch,
    stop: AtomicBool,
    remaining: AtomicU64,
    heartbeat: AtomicU64,
    state: AtomicU8,
    results: Mutex<Receiver<Result<()>>>,
}

impl Signals {
    fn set_state(&self, state: MotionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Bound for the next wait: `2 * remaining * delay + 100 ms`.
    fn timeout(&self, shared: &Shared) -> Duration {
        let remaining = if self.endless {
            1
        } else {
            self.remaining.load(Ordering::Acquire)
        };
        timing::stop_timeout(remaining, shared.delay_per_step_us())
    }

    /// Repeat `poll` while the worker keeps stepping.
    ///
    /// Gives up after a full timeout without a single step.
    fn wait_while_progressing<T>(
        &self,
        shared: &Shared,
        mut poll: impl FnMut(Duration) -> Option<T>,
    ) -> Option<T> {
        let mut seen = self.heartbeat.load(Ordering::Acquire);
        loop {
            if let Some(value) = poll(self.timeout(shared)) {
                return Some(value);
            }
            let now = self.heartbeat.load(Ordering::Acquire);
            if now == seen {
                return None;
            }
            seen = now;
        }
    }

    fn timed_out(&self, what: &str) -> Error {
        self.request_stop();
        warn!("{}: timed out waiting for the worker to {}", self.name, what);
        Error::Motion(MotionError::TimeoutWaitingForWorker)
    }
}

/// Parameters of one motion.
pub(crate) struct Motion<E> {
    pub emitter: E,
    /// Step count, `None` for endless mode.
    pub count: Option<u64>,
    pub skip_step_errors: bool,
    pub interrupt: Subscription,
    pub observer: Option<Observer>,
}

/// Caller-side reference to a worker, usable without the driver lock.
#[derive(Clone)]
pub(crate) struct WorkerHandle {
    signals: Arc<Signals>,
}

/// A running (or finished, not yet collected) motion.
pub(crate) struct Worker {
    handle: WorkerHandle,
    thread: JoinHandle<()>,
}

impl Worker {
    pub(crate) fn spawn<E: StepEmitter>(shared: Arc<Shared>, motion: Motion<E>) -> Self {
        let (results_tx, results_rx) = mpsc::sync_channel(1);
        let signals = Arc::new(Signals {
            name: crate::error::short_string(shared.name()),
            endless: motion.count.is_none(),
            started: Latch::default(),
            exited: Latch::default(),
            observed: Latch::default(),
            stop: AtomicBool::new(false),
            remaining: AtomicU64::new(motion.count.unwrap_or(0)),
            heartbeat: AtomicU64::new(0),
            state: AtomicU8::new(MotionState::Arming.as_u8()),
            results: Mutex::new(results_rx),
        });

        match motion.count {
            Some(count) => debug!("{}: starting worker for {} steps", shared.name(), count),
            None => debug!("{}: starting endless worker", shared.name()),
        }

        let thread = {
            let signals = Arc::clone(&signals);
            thread::spawn(move || work(&shared, &signals, motion, results_tx))
        };

        Self {
            handle: WorkerHandle { signals },
            thread,
        }
    }

    pub(crate) fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Whether the worker thread is still running.
    pub(crate) fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }

    pub(crate) fn state(&self) -> MotionState {
        MotionState::from_u8(self.handle.signals.state.load(Ordering::Acquire))
    }

    pub(crate) fn stop(self, shared: &Shared, force: bool) -> Result<()> {
        self.handle.stop(shared, force)
    }

    /// Ask the worker to exit without waiting for it.
    pub(crate) fn detach(self) {
        self.handle.signals.request_stop();
    }

    /// Discard a finished worker.
    ///
    /// An endless worker's result would otherwise only be reported by
    /// `stop()`; a counted worker's result belongs to its `move_*` caller.
    pub(crate) fn reap(self) {
        let signals = &self.handle.signals;
        if !signals.endless {
            return;
        }
        let results = signals.results.lock().unwrap_or_else(PoisonError::into_inner);
        if let Ok(Err(e)) = results.try_recv() {
            warn!("{}: discarding result of finished motion: {}", signals.name, e);
        }
    }
}

impl WorkerHandle {
    /// Whether `worker` is the one this handle refers to.
    pub(crate) fn is(&self, worker: &Worker) -> bool {
        Arc::ptr_eq(&self.signals, &worker.handle.signals)
    }

    /// Wait until the first step was attempted.
    pub(crate) fn wait_started(&self, shared: &Shared) -> bool {
        self.signals.started.wait(self.signals.timeout(shared))
    }

    /// Wait until the completion observer has returned.
    ///
    /// Call without holding the driver lock: the observer may use the
    /// stepper's getters.
    pub(crate) fn wait_observed(&self, shared: &Shared) -> bool {
        self.signals.observed.wait(self.signals.timeout(shared))
    }

    /// Stop coordinator.
    ///
    /// Endless and forced motions are signalled to stop. A forced counted
    /// motion returns once the worker has exited; its final result goes to
    /// the `move_*` caller. Otherwise the worker's final result is returned.
    pub(crate) fn stop(&self, shared: &Shared, force: bool) -> Result<()> {
        let signals = &self.signals;

        if !self.wait_started(shared) {
            return Err(signals.timed_out("start"));
        }

        if signals.endless || force {
            signals.request_stop();
        }

        if force && !signals.endless {
            info!("{}: was forcefully stopped", signals.name);
            return match signals.wait_while_progressing(shared, |t| {
                signals.exited.wait(t).then_some(())
            }) {
                Some(()) => Ok(()),
                None => Err(signals.timed_out("exit")),
            };
        }

        let results = signals.results.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = signals.wait_while_progressing(shared, |t| match results.recv_timeout(t) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("{}: worker result already collected", signals.name);
                Some(Ok(()))
            }
        });
        drop(results);

        match outcome {
            Some(result) => result,
            None => Err(signals.timed_out("finish")),
        }
    }

    /// Whether the final result is waiting to be collected.
    #[cfg(test)]
    fn has_result(&self) -> bool {
        let results = self.signals.results.lock().unwrap_or_else(PoisonError::into_inner);
        results.try_recv().is_ok()
    }
}

enum Exit {
    Finished,
    Stopped,
}

fn work<E: StepEmitter>(
    shared: &Shared,
    signals: &Signals,
    mut motion: Motion<E>,
    results: SyncSender<Result<()>>,
) {
    signals.set_state(MotionState::Running);

    let (state, result) = match step_loop(shared, signals, &mut motion) {
        Ok(Exit::Finished) => (MotionState::Finished, Ok(())),
        Ok(Exit::Stopped) => (MotionState::Stopped, Ok(())),
        Err(e) => (MotionState::Errored, Err(e)),
    };
    signals.set_state(state);

    match &result {
        Ok(()) => debug!("{}: worker {}", shared.name(), state.name()),
        Err(e) => error!("{}: worker exited: {}", shared.name(), e),
    }

    let error = result.as_ref().err().cloned();
    signals.started.release();
    // single send into a one-slot channel never blocks
    let _ = results.send(result);
    signals.exited.release();

    // Published first: stop() holds the driver lock until it has the result.
    if let Some(observer) = &motion.observer {
        observer(error.as_ref());
    }
    signals.observed.release();
}

fn step_loop<E: StepEmitter>(
    shared: &Shared,
    signals: &Signals,
    motion: &mut Motion<E>,
) -> Result<Exit> {
    let mut remaining = motion.count;

    loop {
        if motion.interrupt.is_raised() {
            return Err(Error::Motion(MotionError::Interrupted));
        }
        if signals.stop.load(Ordering::Acquire) {
            return Ok(Exit::Stopped);
        }

        let outcome = motion.emitter.emit(shared);
        signals.heartbeat.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(()) => {
                if let Some(left) = remaining.as_mut() {
                    *left = left.saturating_sub(1);
                    signals.remaining.store(*left, Ordering::Release);
                    if *left == 0 {
                        return Ok(Exit::Finished);
                    }
                }
            }
            Err(e) if motion.skip_step_errors => {
                warn!("{}: skipping failed step: {}", shared.name(), e);
            }
            Err(e) => return Err(e),
        }

        signals.started.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use embedded_hal::delay::DelayNs;
    use embedded_hal::digital::PinState;

    use crate::motion::PhaseTable;
    use crate::motor::emitter::Commutator;
    use crate::motor::interrupt::Interrupt;
    use crate::output::DigitalWriter;

    #[derive(Default)]
    struct Counting {
        writes: AtomicUsize,
        fail: AtomicBool,
    }

    impl DigitalWriter for Counting {
        type Error = ();

        fn digital_write(&self, _pin: &str, _level: PinState) -> core::result::Result<(), ()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(());
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Clone)]
    struct Sleep;

    impl DelayNs for Sleep {
        fn delay_ns(&mut self, ns: u32) {
            thread::sleep(Duration::from_nanos(u64::from(ns)));
        }
    }

    fn setup(writer: &Arc<Counting>) -> (Arc<Shared>, Commutator<Counting, Sleep>) {
        let shared = Arc::new(Shared::new(
            heapless::String::try_from("worker").unwrap(),
            200,
            210,
            210,
        ));
        let pins = ["A", "B", "C", "D"].map(|p| heapless::String::try_from(p).unwrap());
        (shared, Commutator::new(writer.clone(), pins, PhaseTable::DUAL_PHASE, Sleep))
    }

    fn motion(emitter: Commutator<Counting, Sleep>, count: Option<u64>) -> Motion<Commutator<Counting, Sleep>> {
        Motion {
            emitter,
            count,
            skip_step_errors: false,
            interrupt: Interrupt::new().subscribe(),
            observer: None,
        }
    }

    #[test]
    fn test_counted_worker_finishes() {
        let writer = Arc::new(Counting::default());
        let (shared, emitter) = setup(&writer);

        let worker = Worker::spawn(shared.clone(), motion(emitter, Some(10)));
        let handle = worker.handle();

        assert_eq!(handle.stop(&shared, false), Ok(()));
        assert_eq!(worker.state(), MotionState::Finished);
        assert_eq!(writer.writes.load(Ordering::SeqCst), 40);
        assert_eq!(shared.snapshot().step_num, 10);
    }

    #[test]
    fn test_endless_worker_stops() {
        let writer = Arc::new(Counting::default());
        let (shared, emitter) = setup(&writer);

        let worker = Worker::spawn(shared.clone(), motion(emitter, None));
        assert!(worker.handle().wait_started(&shared));
        thread::sleep(Duration::from_millis(10));

        let handle = worker.handle();
        assert_eq!(worker.stop(&shared, true), Ok(()));
        let writes = writer.writes.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(writer.writes.load(Ordering::SeqCst), writes);
        assert!(!handle.has_result());
    }

    #[test]
    fn test_failed_first_step_is_reported_by_stop() {
        let writer = Arc::new(Counting::default());
        writer.fail.store(true, Ordering::SeqCst);
        let (shared, emitter) = setup(&writer);

        let worker = Worker::spawn(shared.clone(), motion(emitter, None));
        assert!(worker.handle().wait_started(&shared));

        let err = worker.stop(&shared, true).unwrap_err();
        assert!(matches!(err, Error::Motor(_)));
        assert_eq!(shared.snapshot().step_num, 0);
    }

    #[test]
    fn test_observer_sees_final_result() {
        let writer = Arc::new(Counting::default());
        let (shared, emitter) = setup(&writer);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut m = motion(emitter, Some(3));
        let seen = calls.clone();
        let observer: Observer = Arc::new(move |err: Option<&Error>| {
            assert!(err.is_none());
            seen.fetch_add(1, Ordering::SeqCst);
        });
        m.observer = Some(observer);

        let worker = Worker::spawn(shared.clone(), m);
        let handle = worker.handle();
        assert_eq!(handle.stop(&shared, false), Ok(()));
        assert!(handle.wait_observed(&shared));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
