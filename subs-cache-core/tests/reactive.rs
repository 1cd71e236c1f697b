//! Integration Tests for the Reactive Runtime
//!
//! These tests verify that signals, computations and the scheduler work
//! together the way the subscription lifecycle relies on.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use subs_cache_core::reactive::{
    untracked, Computation, ComputationId, ReactiveContext, Runtime, Signal, SignalId,
};
use subs_cache_core::Error;

/// Test that a computation re-runs when a signal it read changes.
#[test]
fn computation_tracks_signal_dependency() {
    let signal = Signal::new(0);
    let observed = Rc::new(Cell::new(-1));

    let s = signal.clone();
    let o = observed.clone();
    let computation = Computation::new(move |_| {
        o.set(s.get());
        Ok(())
    })
    .unwrap();

    // Ran once on creation
    assert_eq!(observed.get(), 0);
    assert_eq!(computation.dependency_count(), 1);

    // Invalidation is queued until the next flush
    signal.set(42);
    assert_eq!(observed.get(), 0);
    assert_eq!(Runtime::pending_count(), 1);

    Runtime::flush().unwrap();
    assert_eq!(observed.get(), 42);
    assert_eq!(computation.run_count(), 2);
}

/// Test that writing an equal value does not invalidate dependents.
#[test]
fn equal_write_is_not_a_change() {
    let signal = Signal::new(String::from("a"));
    let s = signal.clone();
    let computation = Computation::new(move |_| {
        s.get();
        Ok(())
    })
    .unwrap();

    signal.set("a".to_string());
    Runtime::flush().unwrap();
    assert_eq!(computation.run_count(), 1);
}

/// Test that a stopped computation never runs again.
#[test]
fn stopped_computation_does_not_run() {
    let signal = Signal::new(0);
    let runs = Rc::new(Cell::new(0));

    let s = signal.clone();
    let r = runs.clone();
    let computation = Computation::new(move |_| {
        s.get();
        r.set(r.get() + 1);
        Ok(())
    })
    .unwrap();

    computation.stop();
    computation.stop();

    signal.set(1);
    signal.set(2);
    Runtime::flush().unwrap();
    assert_eq!(runs.get(), 1);
}

/// Test that a computation can stop itself, one-shot style.
#[test]
fn computation_stops_itself_when_condition_holds() {
    let ready = Signal::new(false);
    let fired = Rc::new(Cell::new(0));

    let r = ready.clone();
    let f = fired.clone();
    let watcher = Computation::new(move |c| {
        if r.get() {
            f.set(f.get() + 1);
            c.stop();
        }
        Ok(())
    })
    .unwrap();

    ready.set(true);
    Runtime::flush().unwrap();
    ready.set(false);
    ready.set(true);
    Runtime::flush().unwrap();

    assert_eq!(fired.get(), 1);
    assert!(watcher.is_stopped());
}

/// Test that reads inside `untracked` do not become dependencies.
#[test]
fn untracked_reads_are_not_dependencies() {
    let tracked = Signal::new(1);
    let hidden = Signal::new(1);

    let t = tracked.clone();
    let h = hidden.clone();
    let computation = Computation::new(move |_| {
        t.get();
        untracked(|| h.get());
        Ok(())
    })
    .unwrap();

    assert_eq!(computation.dependency_count(), 1);
    hidden.set(2);
    Runtime::flush().unwrap();
    assert_eq!(computation.run_count(), 1);
}

/// Test that deferred tasks run after pending computations are flushed.
#[test]
fn deferred_tasks_run_after_flush() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let signal = Signal::new(0);

    let s = signal.clone();
    let l = log.clone();
    let _computation = Computation::new(move |_| {
        l.borrow_mut().push(format!("run {}", s.get()));
        Ok(())
    })
    .unwrap();

    let l = log.clone();
    Runtime::defer(move || {
        l.borrow_mut().push("task".to_string());
        Ok(())
    });
    signal.set(1);
    assert_eq!(Runtime::deferred_count(), 1);

    assert!(Runtime::run_once().unwrap());
    assert!(!Runtime::run_once().unwrap());
    assert_eq!(*log.borrow(), vec!["run 0", "run 1", "task"]);
}

/// Test that errors from re-runs and tasks surface through the boundary.
#[test]
fn error_boundary_collects_failures() {
    let signal = Signal::new(0);
    let s = signal.clone();
    let _computation = Computation::new(move |_| {
        if s.get() > 0 {
            return Err(Error::MissingSubscriptionRecord("posts".into()));
        }
        Ok(())
    })
    .unwrap();

    signal.set(1);
    assert_eq!(
        Runtime::flush(),
        Err(Error::MissingSubscriptionRecord("posts".into()))
    );
    // The boundary is drained once reported
    assert_eq!(Runtime::flush(), Ok(()));

    Runtime::defer(|| Err(Error::UnknownSlot("late".into())));
    assert_eq!(Runtime::run_until_idle(), Err(Error::UnknownSlot("late".into())));
}

/// Test that a failing first run is returned to the creator.
#[test]
fn first_run_error_is_returned() {
    let result = Computation::new(|_| Err(Error::DuplicateStart("posts".into())));
    assert_eq!(result.err(), Some(Error::DuplicateStart("posts".into())));
}

/// Test that ReactiveContext correctly tracks nested computations.
#[test]
fn nested_reactive_contexts() {
    let outer_id = ComputationId::new();
    let inner_id = ComputationId::new();
    let signals: Vec<SignalId> = (0..4).map(|_| SignalId::new()).collect();

    // Enter outer context
    let _outer_ctx = ReactiveContext::enter(outer_id);
    ReactiveContext::track_dependency(signals[0]);
    ReactiveContext::track_dependency(signals[1]);

    // Enter inner context
    {
        let _inner_ctx = ReactiveContext::enter(inner_id);
        ReactiveContext::track_dependency(signals[2]);
        ReactiveContext::track_dependency(signals[3]);

        // Inner context should see its own dependencies
        let inner_deps = ReactiveContext::get_dependencies();
        assert_eq!(inner_deps.len(), 2);
        assert!(inner_deps.contains(&signals[2]));
        assert!(inner_deps.contains(&signals[3]));
    }

    // Back to outer context, should see outer dependencies only
    let outer_deps = ReactiveContext::get_dependencies();
    assert_eq!(outer_deps.len(), 2);
    assert!(outer_deps.contains(&signals[0]));
    assert!(outer_deps.contains(&signals[1]));
}
