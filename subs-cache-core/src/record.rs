//! Subscription records: one started instantiation of a slot.

use std::cell::{Cell, RefCell};
use std::fmt;

use crate::latch::Latch;
use crate::reactive::{Computation, Signal};
use crate::slot::Args;
use crate::subscription::SlotHandle;

/// Live state of one start of a slot.
///
/// A record is created by the driving computation before its subscribe
/// call is issued, so a stop racing the start always has something to act
/// on. The handle only exists once `started` is released; everything that
/// touches the handle waits on that latch first.
pub(crate) struct SubscriptionRecord {
    pub(crate) index: u64,
    pub(crate) slot: String,
    pub(crate) args: Args,
    /// False when the validity predicate rejected `args`; the handle is
    /// then synthetic.
    pub(crate) valid: bool,
    pub(crate) handle: RefCell<Option<SlotHandle>>,
    pub(crate) ready: Signal<bool>,
    pub(crate) driving: Computation,
    pub(crate) ready_computation: RefCell<Option<Computation>>,
    pub(crate) started: Latch,
    /// Set as soon as a stop is requested; a retiring record is no longer
    /// the slot's active subscription.
    pub(crate) retiring: Cell<bool>,
}

impl SubscriptionRecord {
    pub(crate) fn new(index: u64, slot: &str, args: Args, valid: bool, driving: Computation) -> Self {
        Self {
            index,
            slot: slot.to_owned(),
            args,
            valid,
            handle: RefCell::new(None),
            ready: Signal::new(false),
            driving,
            ready_computation: RefCell::new(None),
            started: Latch::new(),
            retiring: Cell::new(false),
        }
    }

    pub(crate) fn handle(&self) -> Option<SlotHandle> {
        self.handle.borrow().clone()
    }

    /// Args rendered as JSON, for log lines.
    pub(crate) fn args_json(&self) -> String {
        args_json(&self.args)
    }
}

pub(crate) fn args_json(args: &Args) -> String {
    serde_json::to_string(args.as_slice()).unwrap_or_else(|_| "<unprintable>".into())
}

impl fmt::Debug for SubscriptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRecord")
            .field("index", &self.index)
            .field("slot", &self.slot)
            .field("args", &self.args)
            .field("valid", &self.valid)
            .field("handle", &*self.handle.borrow())
            .field("started", &self.started.is_released())
            .field("retiring", &self.retiring.get())
            .finish()
    }
}
