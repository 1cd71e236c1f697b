//! Reactive Primitives
//!
//! This module implements the reactive runtime the subscription cache runs
//! on: signals, tracked computations, untracked scopes and a cooperative
//! scheduler with a deferred task queue.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a computation, the signal registers that computation as a
//! dependent. When the signal's value changes, all dependents are queued.
//!
//! ## Computations
//!
//! A Computation is a side-effecting function that re-runs whenever a
//! signal it read changes. It knows whether it is on its first run and can
//! be stopped, including from inside its own run.
//!
//! ## Scheduling
//!
//! Invalidated computations run at explicit flush points
//! ([`Runtime::flush`]). Work that must happen on a later turn goes through
//! [`Runtime::defer`] and runs from [`Runtime::run_once`] or
//! [`Runtime::run_until_idle`]. There is no parallelism: every hazard here
//! is about ordering and re-entrancy.
//!
//! # Implementation Notes
//!
//! Dependency tracking uses a thread-local context stack. When a signal is
//! read, the top of the stack names the computation to attach it to, or an
//! untracked scope that swallows the read.

mod computation;
mod context;
mod id;
mod runtime;
mod signal;

pub use computation::Computation;
pub use context::{untracked, ReactiveContext};
pub use id::{ComputationId, SignalId};
pub use runtime::Runtime;
pub use signal::Signal;
