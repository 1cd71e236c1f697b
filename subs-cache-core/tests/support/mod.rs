//! Shared test fixtures: a fake subscription transport and a hook recorder.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::Value;
use subs_cache_core::reactive::Signal;
use subs_cache_core::{
    CacheManager, ComponentInstance, LogRecord, SlotOptions, SubscriptionCache, SubscriptionHandle,
};

/// One call seen by the fake transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Subscribe {
        name: String,
        args: Vec<Value>,
        ttl: Option<f64>,
    },
    Stop {
        name: String,
        args: Vec<Value>,
    },
}

type EventLog = Rc<RefCell<Vec<Event>>>;

/// Subscription cache double. Handles of the same publication name share
/// one readiness signal, flipped with [`FakeCache::resolve`].
#[derive(Default)]
pub struct FakeCache {
    events: EventLog,
    ready: RefCell<HashMap<String, Signal<bool>>>,
    issued: RefCell<Vec<Weak<FakeHandle>>>,
}

impl FakeCache {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn subscribe_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Subscribe { .. }))
            .count()
    }

    pub fn stop_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Stop { .. }))
            .count()
    }

    /// Handles handed out that something still holds.
    pub fn live_handles(&self) -> usize {
        self.issued
            .borrow()
            .iter()
            .filter(|handle| handle.strong_count() > 0)
            .count()
    }

    /// Mark every handle of publication `name` ready, now and later.
    pub fn resolve(&self, name: &str) {
        self.signal(name).set(true);
    }

    fn signal(&self, name: &str) -> Signal<bool> {
        self.ready
            .borrow_mut()
            .entry(name.to_owned())
            .or_insert_with(|| Signal::new(false))
            .clone()
    }

    fn handle(&self, name: &str, args: &[Value], ttl: Option<f64>) -> Rc<dyn SubscriptionHandle> {
        self.events.borrow_mut().push(Event::Subscribe {
            name: name.to_owned(),
            args: args.to_vec(),
            ttl,
        });
        let handle = Rc::new(FakeHandle {
            name: name.to_owned(),
            args: args.to_vec(),
            ready: self.signal(name),
            events: self.events.clone(),
        });
        self.issued.borrow_mut().push(Rc::downgrade(&handle));
        handle
    }
}

impl SubscriptionCache for FakeCache {
    fn subscribe(&self, name: &str, args: &[Value]) -> Rc<dyn SubscriptionHandle> {
        self.handle(name, args, None)
    }

    fn subscribe_with_ttl(&self, ttl: f64, name: &str, args: &[Value]) -> Rc<dyn SubscriptionHandle> {
        self.handle(name, args, Some(ttl))
    }
}

struct FakeHandle {
    name: String,
    args: Vec<Value>,
    ready: Signal<bool>,
    events: EventLog,
}

impl SubscriptionHandle for FakeHandle {
    fn ready(&self) -> bool {
        self.ready.get()
    }

    fn stop(&self) {
        self.events.borrow_mut().push(Event::Stop {
            name: self.name.clone(),
            args: self.args.clone(),
        });
    }
}

pub fn subscribe(name: &str, args: Vec<Value>, ttl: Option<f64>) -> Event {
    Event::Subscribe {
        name: name.to_owned(),
        args,
        ttl,
    }
}

pub fn stop(name: &str, args: Vec<Value>) -> Event {
    Event::Stop {
        name: name.to_owned(),
        args,
    }
}

/// A manager whose every cache is `fake`.
pub fn manager(fake: &Rc<FakeCache>) -> CacheManager {
    let fake = fake.clone();
    CacheManager::new(move |_| fake.clone() as Rc<dyn SubscriptionCache>)
}

/// Capture diagnostic lines into a shared vector.
pub fn capture_logs(manager: &CacheManager) -> Rc<RefCell<Vec<LogRecord>>> {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = lines.clone();
    manager.set_logger(Some(Rc::new(move |record: &LogRecord| {
        sink.borrow_mut().push(record.clone());
    })));
    lines
}

/// Ordered record of hook calls, as `"hook:params"`.
#[derive(Clone, Default)]
pub struct HookLog {
    calls: Rc<RefCell<Vec<String>>>,
}

impl HookLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    fn recorder(&self, hook: &'static str) -> impl Fn(&ComponentInstance, &str, &[Value]) + 'static {
        let calls = self.calls.clone();
        move |_, _, args| calls.borrow_mut().push(format!("{hook}:{}", describe(args)))
    }

    /// Attach a recorder to all five lifecycle hooks of `options`.
    pub fn attach(&self, options: SlotOptions) -> SlotOptions {
        options
            .before_start(self.recorder("before_start"))
            .after_start(self.recorder("after_start"))
            .on_ready(self.recorder("on_ready"))
            .before_stop(self.recorder("before_stop"))
            .after_stop(self.recorder("after_stop"))
    }
}

/// Parameters after the publication name, strings unquoted.
fn describe(args: &[Value]) -> String {
    args.iter()
        .skip(1)
        .map(|v| v.as_str().map(str::to_owned).unwrap_or_else(|| v.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}
