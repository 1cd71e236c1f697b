//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals and
//! computations. It records which computation read which signal, queues
//! computations when those signals change, and owns the deferred task queue
//! that sequences work across scheduler turns.
//!
//! # How It Works
//!
//! 1. A computation registers itself when created.
//!
//! 2. When a computation reads a signal, the runtime records the
//!    dependency.
//!
//! 3. When a signal's value changes, the runtime moves its dependents to
//!    the pending queue. Nothing runs yet.
//!
//! 4. [`Runtime::flush`] re-runs pending computations (in invalidation
//!    order) until the queue is empty.
//!
//! 5. [`Runtime::defer`] queues a macrotask. Macrotasks run one at a time
//!    from [`Runtime::run_once`] or [`Runtime::run_until_idle`], each after
//!    a flush, which is how work is pushed to "the next turn".
//!
//! # Threading
//!
//! The runtime is thread-local and single-threaded. All mutation is
//! serialized by the event loop, so there is no locking; the only hazards
//! are ordering and re-entrancy, and the runtime never holds its own state
//! borrowed while user code runs.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use indexmap::IndexSet;

use super::computation::Computation;
use super::context::ReactiveContext;
use super::id::{ComputationId, SignalId};
use crate::error::{Error, Result};

type Task = Box<dyn FnOnce() -> Result<()>>;

#[derive(Default)]
struct RuntimeState {
    computations: HashMap<ComputationId, Computation>,
    signal_subscribers: HashMap<SignalId, IndexSet<ComputationId>>,
    pending: IndexSet<ComputationId>,
    macrotasks: VecDeque<Task>,
    flushing: bool,
    errors: Vec<Error>,
}

impl RuntimeState {
    /// Drop `computation` from each signal's subscriber set, and drop sets
    /// left empty.
    fn forget_edges<I>(&mut self, computation: ComputationId, signals: I)
    where
        I: IntoIterator<Item = SignalId>,
    {
        for signal in signals {
            if let Some(subs) = self.signal_subscribers.get_mut(&signal) {
                subs.shift_remove(&computation);
                if subs.is_empty() {
                    self.signal_subscribers.remove(&signal);
                }
            }
        }
    }
}

thread_local! {
    static STATE: RefCell<RuntimeState> = RefCell::new(RuntimeState::default());
}

/// The thread's reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Register a live computation.
    pub(crate) fn register(computation: &Computation) {
        STATE.with(|state| {
            state
                .borrow_mut()
                .computations
                .insert(computation.id(), computation.clone());
        });
    }

    /// Forget a stopped computation and the edges from the signals it read.
    pub(crate) fn unregister<I>(id: ComputationId, signals: I)
    where
        I: IntoIterator<Item = SignalId>,
    {
        // The removed handle may be the last strong reference to the
        // computation's closure; drop it after the borrow is released.
        let removed = STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.pending.shift_remove(&id);
            state.forget_edges(id, signals);
            state.computations.remove(&id)
        });
        drop(removed);
    }

    /// Record that a computation depends on a signal.
    pub fn add_dependency(signal: SignalId, computation: ComputationId) {
        STATE.with(|state| {
            let mut state = state.borrow_mut();
            if state.computations.contains_key(&computation) {
                state
                    .signal_subscribers
                    .entry(signal)
                    .or_default()
                    .insert(computation);
            }
        });
    }

    /// Remove a computation's edges from the given signals.
    ///
    /// Called with the signals of the previous run before re-running a
    /// computation.
    pub(crate) fn clear_dependencies<I>(computation: ComputationId, signals: I)
    where
        I: IntoIterator<Item = SignalId>,
    {
        STATE.with(|state| state.borrow_mut().forget_edges(computation, signals));
    }

    /// Queue every dependent of a signal for re-run.
    pub fn notify_signal_change(signal: SignalId) {
        STATE.with(|state| {
            let mut state = state.borrow_mut();
            let Some(subscribers) = state.signal_subscribers.remove(&signal) else {
                return;
            };
            for id in subscribers {
                if state.computations.contains_key(&id) {
                    state.pending.insert(id);
                }
            }
        });
    }

    /// Re-run pending computations until none remain.
    ///
    /// Returns the first error collected by the error boundary during the
    /// flush (or reported before it). A flush requested while one is
    /// already running is a no-op; the outer flush picks up the work.
    pub fn flush() -> Result<()> {
        let entered = STATE.with(|state| {
            let mut state = state.borrow_mut();
            !std::mem::replace(&mut state.flushing, true)
        });
        if !entered {
            tracing::trace!("reactive.flush.reentrant");
            return Ok(());
        }

        loop {
            let next = STATE.with(|state| {
                let mut state = state.borrow_mut();
                while let Some(id) = state.pending.shift_remove_index(0) {
                    if let Some(computation) = state.computations.get(&id) {
                        return Some(computation.clone());
                    }
                }
                None
            });
            let Some(computation) = next else {
                break;
            };
            if let Err(err) = computation.execute() {
                Self::report(err);
            }
        }

        STATE.with(|state| state.borrow_mut().flushing = false);
        Self::take_error()
    }

    /// Queue a task for a later scheduler turn.
    pub fn defer<F>(task: F)
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        STATE.with(|state| state.borrow_mut().macrotasks.push_back(Box::new(task)));
    }

    /// Flush, then run at most one deferred task.
    ///
    /// Returns whether a task ran.
    pub fn run_once() -> Result<bool> {
        let flushed = Self::flush();
        let Some(task) = Self::next_task() else {
            flushed?;
            return Ok(false);
        };
        if let Err(err) = task() {
            Self::report(err);
        }
        flushed?;
        Self::flush()?;
        Ok(true)
    }

    /// Alternate flushes and deferred tasks until both queues are empty.
    ///
    /// Every task runs even if an earlier one failed; the first failure is
    /// returned at the end.
    pub fn run_until_idle() -> Result<()> {
        let mut first = None;
        loop {
            if let Err(err) = Self::flush() {
                first.get_or_insert(err);
            }
            let Some(task) = Self::next_task() else {
                break;
            };
            if let Err(err) = task() {
                Self::report(err);
            }
        }
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_task() -> Option<Task> {
        STATE.with(|state| state.borrow_mut().macrotasks.pop_front())
    }

    /// Hand an error to the boundary. It is logged now and returned by the
    /// next flush.
    pub fn report(err: Error) {
        tracing::error!(error = %err, "reactive.error_boundary");
        STATE.with(|state| state.borrow_mut().errors.push(err));
    }

    fn take_error() -> Result<()> {
        let errors = STATE.with(|state| std::mem::take(&mut state.borrow_mut().errors));
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of computations waiting for a flush.
    pub fn pending_count() -> usize {
        STATE.with(|state| state.borrow().pending.len())
    }

    /// Number of signals with at least one live dependent.
    pub fn tracked_signal_count() -> usize {
        STATE.with(|state| state.borrow().signal_subscribers.len())
    }

    /// Number of deferred tasks not yet run.
    pub fn deferred_count() -> usize {
        STATE.with(|state| state.borrow().macrotasks.len())
    }

    /// Get the computation currently collecting dependencies, if any.
    pub fn current_computation() -> Option<ComputationId> {
        ReactiveContext::current_computation()
    }

    /// Check if signal reads are currently tracked.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_tracking()
    }
}
