use std::mem;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

/// How long closing waits for the worker to acknowledge the stop request.
const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Periodic cleanup work performed by a [`Sweeper`].
pub trait Sweep: Send + Sync {
    /// Perform one sweep. Returns whether any entries remain.
    fn sweep(&self) -> bool;

    /// Return whether any entries remain.
    fn has_entries(&self) -> bool;
}

/// A background worker which periodically sweeps a cache.
///
/// The worker thread is started lazily when an entry is added to an empty
/// cache and stops itself once the cache is empty again, so an idle cache
/// costs no thread. Closing the sweeper stops the worker for good; it is
/// never restarted after that.
pub struct Sweeper {
    interval: Duration,
    state: Arc<Mutex<State>>,
}

enum State {
    Idle,
    Running(Sender<StopRequest>),
    Closed,
}

struct StopRequest {
    ack: Sender<()>,
}

impl Sweeper {
    pub fn new(interval: Duration) -> Self {
        Sweeper {
            interval,
            state: Arc::new(Mutex::new(State::Idle)),
        }
    }

    /// Ensure the worker is running.
    ///
    /// Called after an entry is added to the swept cache. The caller must
    /// not hold the cache's own lock; the worker takes that lock while
    /// deciding whether to stop.
    pub fn entry_added(&self, task: Arc<dyn Sweep>) {
        let mut state = self.state.lock().unwrap();
        if !matches!(*state, State::Idle) {
            return;
        }
        let (tx, rx) = unbounded();
        let shared = Arc::clone(&self.state);
        let interval = self.interval;
        thread::spawn(move || run(shared, rx, task, interval));
        *state = State::Running(tx);
        debug!(target: "omnivfs::sweeper", "sweeper started");
    }

    /// Stop the worker and refuse to ever start it again.
    pub fn close(&self) {
        let sender = {
            let mut state = self.state.lock().unwrap();
            match mem::replace(&mut *state, State::Closed) {
                State::Running(tx) => Some(tx),
                _ => None,
            }
        };
        if let Some(tx) = sender {
            let (ack_tx, ack_rx) = bounded(1);
            if tx.send(StopRequest { ack: ack_tx }).is_ok()
                && ack_rx.recv_timeout(STOP_TIMEOUT).is_err()
            {
                warn!(
                    target: "omnivfs::sweeper",
                    "sweeper did not acknowledge the stop request in time",
                );
            }
        }
    }
}

fn run(
    state: Arc<Mutex<State>>,
    rx: Receiver<StopRequest>,
    task: Arc<dyn Sweep>,
    interval: Duration,
) {
    loop {
        match rx.recv_timeout(interval) {
            Ok(request) => {
                debug!(target: "omnivfs::sweeper", "sweeper stopped");
                let _ = request.ack.send(());
                return;
            }
            Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }
        if task.sweep() {
            continue;
        }
        // The cache looked empty, but an insert may have won the race to
        // the state lock. Re-check under it before standing down.
        let mut guard = state.lock().unwrap();
        if task.has_entries() {
            continue;
        }
        if matches!(*guard, State::Running(_)) {
            *guard = State::Idle;
            debug!(target: "omnivfs::sweeper", "sweeper stopped, cache empty");
        }
        return;
    }
}
