//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! the current computation is registered as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! Entering a computation pushes a tracking entry; [`untracked`] pushes a
//! suspended entry so that reads inside it attach to nothing. Nested
//! computations (a computation created while another one runs) get their
//! own entry and do not leak reads into the outer one.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::id::{ComputationId, SignalId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone)]
struct ContextEntry {
    /// The computation being tracked, or `None` inside an untracked scope.
    computation: Option<ComputationId>,
    /// Signals read while this entry was on top of the stack.
    dependencies: SmallVec<[SignalId; 8]>,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub struct ReactiveContext {
    computation: Option<ComputationId>,
}

impl ReactiveContext {
    /// Enter a tracking context for the given computation.
    pub fn enter(computation: ComputationId) -> Self {
        Self::push(Some(computation))
    }

    /// Enter a scope in which signal reads are not tracked.
    pub fn suspend() -> Self {
        Self::push(None)
    }

    fn push(computation: Option<ComputationId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                computation,
                dependencies: SmallVec::new(),
            });
        });

        Self { computation }
    }

    /// Check if reads would currently be tracked.
    pub fn is_tracking() -> bool {
        Self::current_computation().is_some()
    }

    /// Get the computation currently collecting dependencies, if any.
    pub fn current_computation() -> Option<ComputationId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.computation))
    }

    /// Record a dependency on the given signal.
    ///
    /// Returns the computation that now depends on it, if reads are tracked.
    pub fn track_dependency(signal: SignalId) -> Option<ComputationId> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let entry = stack.last_mut()?;
            let computation = entry.computation?;
            entry.dependencies.push(signal);
            Some(computation)
        })
    }

    /// Get the dependencies collected in the current context.
    pub fn get_dependencies() -> Vec<SignalId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.to_vec())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.computation, self.computation,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.computation, entry.computation
                );
            }
        });
    }
}

/// Run `f` without attaching any signal reads to the surrounding computation.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::suspend();
    f()
}
