//! Computation Implementation
//!
//! A Computation is a side-effecting function that re-runs whenever a
//! signal it read during its previous run changes.
//!
//! # How Computations Work
//!
//! 1. When created, the computation runs immediately to establish its
//!    initial dependencies. `is_first_run()` is true during that run only.
//!
//! 2. When any dependency changes, the runtime queues the computation. It
//!    re-runs on the next flush, not synchronously inside `Signal::set`.
//!
//! 3. Before re-running, old dependencies are cleared and new ones are
//!    tracked during execution, so a run only ever depends on what it
//!    actually read.
//!
//! 4. A stopped computation never runs again. Stopping is idempotent and a
//!    computation may stop itself from inside its own run.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::id::{ComputationId, SignalId};
use super::runtime::Runtime;
use crate::error::Result;

type RunFn = dyn Fn(&Computation) -> Result<()>;

/// A tracked, re-runnable side effect.
///
/// # Example
///
/// ```rust
/// use subs_cache_core::reactive::{Computation, Runtime, Signal};
///
/// let count = Signal::new(0);
/// let reader = count.clone();
/// let c = Computation::new(move |_| {
///     println!("count is {}", reader.get());
///     Ok(())
/// })
/// .unwrap();
///
/// count.set(5);
/// Runtime::flush().unwrap(); // prints "count is 5"
/// assert_eq!(c.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Computation {
    inner: Rc<ComputationInner>,
}

struct ComputationInner {
    id: ComputationId,
    run: Box<RunFn>,
    first_run: Cell<bool>,
    stopped: Cell<bool>,
    run_count: Cell<usize>,
    dependencies: RefCell<HashSet<SignalId>>,
}

impl Computation {
    /// Create a computation and run it once.
    ///
    /// A failing first run stops the computation and returns the error.
    pub fn new<F>(run: F) -> Result<Self>
    where
        F: Fn(&Computation) -> Result<()> + 'static,
    {
        let computation = Self {
            inner: Rc::new(ComputationInner {
                id: ComputationId::new(),
                run: Box::new(run),
                first_run: Cell::new(true),
                stopped: Cell::new(false),
                run_count: Cell::new(0),
                dependencies: RefCell::new(HashSet::new()),
            }),
        };

        Runtime::register(&computation);

        if let Err(err) = computation.execute() {
            computation.stop();
            return Err(err);
        }

        Ok(computation)
    }

    /// Get the computation's unique ID.
    pub fn id(&self) -> ComputationId {
        self.inner.id
    }

    /// True while the first run is executing.
    pub fn is_first_run(&self) -> bool {
        self.inner.first_run.get()
    }

    /// Execute the computation function inside a tracking context.
    pub(crate) fn execute(&self) -> Result<()> {
        if self.is_stopped() {
            return Ok(());
        }

        let stale = std::mem::take(&mut *self.inner.dependencies.borrow_mut());
        Runtime::clear_dependencies(self.inner.id, stale);

        let (result, deps) = {
            let _ctx = ReactiveContext::enter(self.inner.id);
            let result = (self.inner.run)(self);
            (result, ReactiveContext::get_dependencies())
        };

        if self.is_stopped() {
            // Reads made after a self-stop must not keep it subscribed.
            Runtime::clear_dependencies(self.inner.id, deps);
        } else {
            *self.inner.dependencies.borrow_mut() = deps.into_iter().collect();
        }

        self.inner.run_count.set(self.inner.run_count.get() + 1);
        self.inner.first_run.set(false);

        result
    }

    /// Stop the computation. It will not run again.
    pub fn stop(&self) {
        if self.inner.stopped.replace(true) {
            return;
        }
        let dependencies = std::mem::take(&mut *self.inner.dependencies.borrow_mut());
        Runtime::unregister(self.inner.id, dependencies);
    }

    /// Check if the computation has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.get()
    }

    /// Get the number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of signals read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.borrow().len()
    }
}

impl std::fmt::Debug for Computation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
