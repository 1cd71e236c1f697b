//! One-shot completion latches.
//!
//! A [`Latch`] starts open and is released exactly once. Continuations
//! registered while it is open run, in registration order, at the moment it
//! is released; continuations registered afterwards run immediately.
//!
//! Subscription records use one latch for "the deferred subscribe call has
//! landed" and one per stop for "teardown has finished". [`StopSignal`]
//! exposes the latter to callers as something they can poll or await.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

type Continuation = Box<dyn FnOnce()>;

enum LatchState {
    Open(Vec<Continuation>),
    Released,
}

/// A one-shot completion latch.
#[derive(Clone)]
pub(crate) struct Latch {
    state: Rc<RefCell<LatchState>>,
}

impl Latch {
    pub(crate) fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(LatchState::Open(Vec::new()))),
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        matches!(*self.state.borrow(), LatchState::Released)
    }

    /// Run `f` once the latch is released (now, if it already is).
    pub(crate) fn when_released<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        {
            let mut state = self.state.borrow_mut();
            if let LatchState::Open(waiting) = &mut *state {
                waiting.push(Box::new(f));
                return;
            }
        }
        f();
    }

    /// Release the latch and run everything that was waiting on it.
    pub(crate) fn release(&self) {
        let previous = std::mem::replace(&mut *self.state.borrow_mut(), LatchState::Released);
        if let LatchState::Open(waiting) = previous {
            for continuation in waiting {
                continuation();
            }
        }
    }

    /// A caller-facing signal that completes when this latch releases.
    pub(crate) fn signal(&self) -> StopSignal {
        let (tx, rx) = oneshot::channel();
        self.when_released(move || {
            let _ = tx.send(());
        });
        StopSignal { rx, complete: false }
    }
}

impl std::fmt::Debug for Latch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Latch")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Completion signal returned by a stop.
///
/// Completes once the handle has been stopped and the stop hooks have run.
/// It can be polled with [`StopSignal::is_complete`] from synchronous code
/// or awaited. Awaiting yields an error only if the stop was abandoned,
/// which happens when the component's whole state is dropped before the
/// start it was waiting on ever landed.
#[derive(Debug)]
pub struct StopSignal {
    rx: oneshot::Receiver<()>,
    complete: bool,
}

impl StopSignal {
    /// Check whether the stop has fully landed.
    pub fn is_complete(&mut self) -> bool {
        if !self.complete {
            self.complete = self.rx.try_recv().is_ok();
        }
        self.complete
    }
}

impl Future for StopSignal {
    type Output = std::result::Result<(), oneshot::error::RecvError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.complete {
            return Poll::Ready(Ok(()));
        }
        let polled = Pin::new(&mut self.rx).poll(cx);
        if let Poll::Ready(Ok(())) = polled {
            self.complete = true;
        }
        polled
    }
}
