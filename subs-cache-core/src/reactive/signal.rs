//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a tracked computation, the signal
//!    registers that computation as a dependent with the runtime.
//!
//! 2. When a signal's value changes, every dependent is queued for a re-run.
//!
//! 3. Writing a value equal to the current one is not a change and notifies
//!    nobody. Readiness cells rely on this: setting `true` twice must not
//!    wake the aggregate twice.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::id::SignalId;
use super::runtime::Runtime;

/// A reactive cell holding a value of type T.
///
/// Clones share the same value and identity.
///
/// # Example
///
/// ```rust
/// use subs_cache_core::reactive::Signal;
///
/// let ready = Signal::new(false);
/// assert!(!ready.get());
///
/// ready.set(true);
/// assert!(ready.get());
/// ```
pub struct Signal<T> {
    id: SignalId,
    value: Rc<RefCell<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            id: SignalId::new(),
            value: Rc::new(RefCell::new(value)),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SignalId {
        self.id
    }

    /// Get the current value.
    ///
    /// If called within a tracked computation, this also registers the
    /// computation as a dependent.
    pub fn get(&self) -> T {
        if let Some(computation) = ReactiveContext::track_dependency(self.id) {
            Runtime::add_dependency(self.id, computation);
        }
        self.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.value.borrow().clone()
    }

    /// Set a new value and invalidate dependents if it differs.
    pub fn set(&self, value: T) {
        let changed = {
            let mut current = self.value.borrow_mut();
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        };

        if changed {
            Runtime::notify_signal_change(self.id);
        }
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.value.borrow());
        self.set(next);
    }
}

impl<T> Default for Signal<T>
where
    T: Clone + PartialEq + Default + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Rc::clone(&self.value),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &*self.value.borrow())
            .finish()
    }
}
