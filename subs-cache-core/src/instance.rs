//! Per-component cached-subscription state.
//!
//! A [`CachedSubscriptionInstance`] owns every slot registered on one
//! component instance and drives each slot through its lifecycle:
//!
//! ```text
//! registered --start_sub--> started --deferred subscribe--> handle live
//!     ^                        |   \                            |
//!     |                        |    args change: stop old,      |
//!     |                        |    issue new behind it         |
//!     +-------- stop_sub ------+--------------------------------+
//! ```
//!
//! Starting a slot installs a *driving computation* that evaluates the
//! slot's arguments. Each distinct argument list becomes a
//! [`SubscriptionRecord`]; the subscribe call itself is deferred to the
//! next scheduler turn and guarded by the record's start latch, so stops
//! and restarts issued before it lands simply queue behind it.
//!
//! No `RefCell` borrow is held across a hook, a subscribe call or a
//! computation run; all of those may call back into this instance.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::component::{ComponentId, ComponentInstance, WeakComponent};
use crate::config::Diagnostics;
use crate::defaults::DefaultSubscriptions;
use crate::error::{Error, Result};
use crate::latch::{Latch, StopSignal};
use crate::reactive::{untracked, Computation, Runtime, Signal};
use crate::readiness::all_ready;
use crate::record::{args_json, SubscriptionRecord};
use crate::slot::{ArgSpec, Args, RegistrationId, SlotHook, SlotOptions, SlotRegistry};
use crate::subscription::{SlotHandle, SubscriptionCache};

/// What a cached instance shares with the cache it was made by.
#[derive(Clone)]
pub(crate) struct CacheContext {
    pub(crate) cache: Rc<dyn SubscriptionCache>,
    pub(crate) default_ttl: Option<f64>,
    pub(crate) defaults: Rc<DefaultSubscriptions>,
    pub(crate) diagnostics: Rc<Diagnostics>,
}

/// Cached-subscription state of one component instance.
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct CachedSubscriptionInstance {
    inner: Rc<Inner>,
}

struct Inner {
    component: WeakComponent,
    component_id: ComponentId,
    label: String,
    context: CacheContext,
    state: RefCell<State>,
    /// Bumped on every issued record. Read by the aggregate as a trigger.
    issued: Signal<u64>,
}

struct State {
    registry: SlotRegistry,
    records: HashMap<u64, Rc<SubscriptionRecord>>,
    next_index: u64,
}

impl CachedSubscriptionInstance {
    pub(crate) fn new(component: &ComponentInstance, context: CacheContext) -> Self {
        Self {
            inner: Rc::new(Inner {
                component: component.downgrade(),
                component_id: component.id(),
                label: component.label(),
                context,
                state: RefCell::new(State {
                    registry: SlotRegistry::new(),
                    records: HashMap::new(),
                    next_index: 0,
                }),
                issued: Signal::new(1),
            }),
        }
    }

    fn from_weak(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    pub fn component_id(&self) -> ComponentId {
        self.inner.component_id
    }

    /// `TypeName|instance-id` of the owning component.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn component(&self) -> Option<ComponentInstance> {
        self.inner.component.upgrade()
    }

    /// Register a slot. Returns `Ok(false)` when the id is already taken;
    /// the existing slot is kept and a warning logged.
    pub fn register_slot(&self, slot_id: &str, spec: ArgSpec, options: SlotOptions) -> Result<bool> {
        self.register_owned(slot_id, Rc::new(spec), Rc::new(options), RegistrationId::new())
    }

    pub(crate) fn register_owned(
        &self,
        slot_id: &str,
        spec: Rc<ArgSpec>,
        options: Rc<SlotOptions>,
        owner: RegistrationId,
    ) -> Result<bool> {
        if spec.is_empty() {
            return Err(Error::EmptyArgumentSpec(slot_id.to_owned()));
        }
        let added = self
            .inner
            .state
            .borrow_mut()
            .registry
            .register(slot_id, spec, options, owner);
        if added {
            self.debug(slot_id, || "registered".to_string());
        } else {
            self.inner.context.diagnostics.warn(
                Some(self.label()),
                Some(slot_id),
                format!("already has a sub with id {slot_id}. Excluding."),
            );
        }
        Ok(added)
    }

    /// Registered slot ids, in declaration order.
    pub fn slot_ids(&self) -> Vec<String> {
        self.inner.state.borrow().registry.ids()
    }

    pub fn is_registered(&self, slot_id: &str) -> bool {
        self.inner.state.borrow().registry.get(slot_id).is_some()
    }

    pub(crate) fn owner_of(&self, slot_id: &str) -> Option<RegistrationId> {
        self.inner.state.borrow().registry.get(slot_id).map(|slot| slot.owner)
    }

    /// Whether the slot may still be started; false once its component has
    /// begun tearing down.
    pub fn allowed_to_start(&self, slot_id: &str) -> bool {
        self.inner
            .state
            .borrow()
            .registry
            .get(slot_id)
            .map_or(false, |slot| slot.allowed_to_start)
    }

    pub(crate) fn disallow_start(&self, slot_id: &str) {
        if let Some(slot) = self.inner.state.borrow_mut().registry.get_mut(slot_id) {
            slot.allowed_to_start = false;
        }
    }

    /// Whether the lifecycle binding ever issued `start_sub` for the slot.
    pub fn start_was_called(&self, slot_id: &str) -> bool {
        self.inner
            .state
            .borrow()
            .registry
            .get(slot_id)
            .map_or(false, |slot| slot.start_was_called)
    }

    pub(crate) fn mark_start_called(&self, slot_id: &str) {
        if let Some(slot) = self.inner.state.borrow_mut().registry.get_mut(slot_id) {
            slot.start_was_called = true;
        }
    }

    /// Whether the slot has a driving computation.
    pub fn is_started(&self, slot_id: &str) -> bool {
        self.inner
            .state
            .borrow()
            .registry
            .get(slot_id)
            .map_or(false, |slot| slot.started)
    }

    /// Start a slot.
    ///
    /// Installs the driving computation. Its first run records the current
    /// arguments and, unless they are invalid, queues the subscribe call
    /// for the next scheduler turn. Later runs restart the subscription
    /// whenever the arguments change.
    pub fn start_sub(&self, slot_id: &str) -> Result<()> {
        self.debug(slot_id, || "start".to_string());
        let spec = {
            let mut state = self.inner.state.borrow_mut();
            let slot = state
                .registry
                .get_mut(slot_id)
                .ok_or_else(|| Error::UnknownSlot(slot_id.to_owned()))?;
            if slot.started {
                return Err(Error::DuplicateStart(slot_id.to_owned()));
            }
            slot.started = true;
            slot.spec.clone()
        };

        let weak = Rc::downgrade(&self.inner);
        let slot = slot_id.to_owned();
        let driving = Computation::new(move |c| match Self::from_weak(&weak) {
            Some(this) => this.drive(&slot, &spec, c),
            None => {
                c.stop();
                Ok(())
            }
        });

        if let Err(err) = driving {
            if let Some(slot) = self.inner.state.borrow_mut().registry.get_mut(slot_id) {
                slot.started = false;
            }
            return Err(err);
        }
        Ok(())
    }

    /// Stop a slot's active subscription and its driving computation.
    pub fn stop_sub(&self, slot_id: &str) -> Result<StopSignal> {
        self.stop_sub_with(slot_id, true)
    }

    /// Stop a slot's active subscription.
    ///
    /// With `stop_driving` the driving computation stops too and the slot
    /// goes back to unstarted. Without it only the handle is released; the
    /// driving computation stays up.
    ///
    /// The stop waits for the record's subscribe call to land first. The
    /// returned signal completes once the handle is stopped and the stop
    /// hooks have run.
    pub fn stop_sub_with(&self, slot_id: &str, stop_driving: bool) -> Result<StopSignal> {
        self.debug(slot_id, || "stop".to_string());
        let record = self.active_record(slot_id)?;
        Ok(self.begin_stop(record, stop_driving).signal())
    }

    /// Stop a slot and start it again once the stop has landed.
    ///
    /// Failures of the delayed start surface through the runtime's error
    /// boundary.
    pub fn restart_sub(&self, slot_id: &str) -> Result<()> {
        self.debug(slot_id, || "restart".to_string());
        let record = self.active_record(slot_id)?;
        let done = self.begin_stop(record, true);

        let this = self.clone();
        let slot = slot_id.to_owned();
        done.when_released(move || {
            if let Err(err) = Runtime::flush() {
                Runtime::report(err);
            }
            if !this.allowed_to_start(&slot) {
                this.inner.context.diagnostics.info(
                    Some(this.label()),
                    Some(slot.as_str()),
                    "restart [PREVENTED!]",
                );
                return;
            }
            if let Err(err) = this.start_sub(&slot) {
                Runtime::report(err);
            }
        });
        Ok(())
    }

    /// Whether the slot's active subscription is ready. False when the
    /// slot is unknown or has nothing active.
    pub fn slot_ready(&self, slot_id: &str) -> bool {
        let current = match self.inner.state.borrow().registry.get(slot_id) {
            Some(slot) => slot.current.clone(),
            None => return false,
        };
        let ready = current.get().and_then(|index| {
            self.inner
                .state
                .borrow()
                .records
                .get(&index)
                .map(|record| record.ready.clone())
        });
        ready.map_or(false, |ready| ready.get())
    }

    /// True when every registered slot is ready. A slot that was never
    /// started is not ready; an instance without slots is.
    pub fn all_cached_slots_ready(&self) -> bool {
        self.inner.issued.get();
        let ids = self.slot_ids();
        all_ready(ids.iter().map(|id| self.slot_ready(id)))
    }

    /// Cached slots AND the component's own subscriptions AND the default
    /// subscriptions.
    pub fn all_subs_ready(&self) -> bool {
        let component = self.component();
        all_ready([
            self.all_cached_slots_ready(),
            component.map_or(true, |c| c.own_subscriptions_ready()),
            self.inner.context.defaults.all_ready(),
        ])
    }

    /// [`all_subs_ready`](Self::all_subs_ready) AND every ancestor
    /// component's readiness predicate.
    pub fn all_subs_ready_including_ancestors(&self) -> bool {
        let base = self.all_subs_ready();
        let ancestors = self.component().map(|c| c.ancestors()).unwrap_or_default();
        all_ready(std::iter::once(base).chain(ancestors.iter().map(|a| a.subscriptions_ready())))
    }

    /// Handle of the slot's active subscription, once its subscribe call
    /// has landed.
    pub fn get_handle(&self, slot_id: &str) -> Option<SlotHandle> {
        let record = self.current_record(slot_id)?;
        let handle = record.handle();
        self.debug(slot_id, || format!("handle: {handle:?}"));
        handle
    }

    /// Arguments of the slot's active subscription.
    pub fn subscription_args(&self, slot_id: &str) -> Option<Vec<Value>> {
        self.current_record(slot_id)
            .map(|record| record.args.to_vec())
    }

    fn current_record(&self, slot_id: &str) -> Option<Rc<SubscriptionRecord>> {
        let state = self.inner.state.borrow();
        let index = state.registry.get(slot_id)?.current.get_untracked()?;
        state.records.get(&index).cloned()
    }

    fn active_record(&self, slot_id: &str) -> Result<Rc<SubscriptionRecord>> {
        if !self.is_registered(slot_id) {
            return Err(Error::UnknownSlot(slot_id.to_owned()));
        }
        self.current_record(slot_id)
            .filter(|record| !record.retiring.get())
            .ok_or_else(|| Error::NoActiveSubscription(slot_id.to_owned()))
    }

    fn slot_options(&self, slot_id: &str) -> Option<Rc<SlotOptions>> {
        self.inner
            .state
            .borrow()
            .registry
            .get(slot_id)
            .map(|slot| slot.options.clone())
    }

    /// One run of a slot's driving computation.
    fn drive(&self, slot_id: &str, spec: &ArgSpec, c: &Computation) -> Result<()> {
        let Some(component) = self.component() else {
            c.stop();
            return Ok(());
        };
        let args = spec.evaluate(&component);

        let mut prior = None;
        if !c.is_first_run() {
            let record = self
                .current_record(slot_id)
                .ok_or_else(|| Error::MissingSubscriptionRecord(slot_id.to_owned()))?;
            if record.retiring.get() {
                self.debug(slot_id, || "re-run while stopping; ignored".to_string());
                return Ok(());
            }
            if record.args == args {
                self.debug(slot_id, || "re-run without argument change".to_string());
                return Ok(());
            }
            self.debug(slot_id, || {
                format!(
                    "arguments changed {} -> {}; stopping prior to restart",
                    record.args_json(),
                    args_json(&args)
                )
            });
            prior = Some(self.begin_stop(record, false));
        }

        self.issue(slot_id, args, c, prior)
    }

    /// Record a new start of `slot_id` with `args` and queue its
    /// subscribe call, behind `prior` when an older record is stopping.
    fn issue(&self, slot_id: &str, args: Args, c: &Computation, prior: Option<Latch>) -> Result<()> {
        let options = self
            .slot_options(slot_id)
            .ok_or_else(|| Error::UnknownSlot(slot_id.to_owned()))?;
        let params = args.get(1..).unwrap_or_default();
        let valid = untracked(|| (options.arg_validity)(params));
        if !valid {
            self.debug(slot_id, || {
                format!("arguments {} not valid; not subscribing", args_json(&args))
            });
        }

        let record = {
            let mut state = self.inner.state.borrow_mut();
            state.next_index += 1;
            let index = state.next_index;
            let record = Rc::new(SubscriptionRecord::new(index, slot_id, args, valid, c.clone()));
            state.records.insert(index, record.clone());
            if let Some(slot) = state.registry.get(slot_id) {
                slot.current.set(Some(index));
            }
            record
        };
        self.inner.issued.update(|n| n + 1);
        self.debug(slot_id, || format!("assigned sub-index {}", record.index));

        let this = self.clone();
        let launch = move || this.launch(record, options);
        match prior {
            Some(latch) => latch.when_released(launch),
            None => launch(),
        }
        Ok(())
    }

    /// Run `before_start`, then queue the subscribe call.
    fn launch(&self, record: Rc<SubscriptionRecord>, options: Rc<SlotOptions>) {
        if record.valid {
            self.call_hook(options.before_start.as_ref(), &record);
            self.debug(&record.slot, || "before start".to_string());
        }
        let this = self.clone();
        Runtime::defer(move || {
            this.subscribe(&record, &options);
            Ok(())
        });
    }

    /// The deferred half of a start: subscribe, watch readiness, run
    /// `after_start` and release the start latch.
    fn subscribe(&self, record: &Rc<SubscriptionRecord>, options: &Rc<SlotOptions>) {
        if let Err(err) = Runtime::flush() {
            Runtime::report(err);
        }

        let handle = if record.valid {
            let (name, params) = split_name(&record.args);
            let cache = &self.inner.context.cache;
            let handle = untracked(|| match options.expire_after.or(self.inner.context.default_ttl) {
                Some(ttl) => cache.subscribe_with_ttl(ttl, &name, params),
                None => cache.subscribe(&name, params),
            });
            self.debug(&record.slot, || format!("subscribed {}", record.args_json()));
            SlotHandle::Real(handle)
        } else {
            SlotHandle::Synthetic
        };
        *record.handle.borrow_mut() = Some(handle.clone());

        // The record owns its watcher, so the watcher only holds it weakly.
        let weak = Rc::downgrade(&self.inner);
        let watched = Rc::downgrade(record);
        let on_ready = options.on_ready.clone();
        let watcher = Computation::new(move |c| {
            let Some(record) = watched.upgrade() else {
                c.stop();
                return Ok(());
            };
            if handle.ready() {
                record.ready.set(true);
                if let Some(this) = Self::from_weak(&weak) {
                    this.call_hook(on_ready.as_ref(), &record);
                    this.debug(&record.slot, || "ready".to_string());
                }
                c.stop();
            }
            Ok(())
        });
        match watcher {
            Ok(watcher) => *record.ready_computation.borrow_mut() = Some(watcher),
            Err(err) => Runtime::report(err),
        }

        if record.valid {
            self.call_hook(options.after_start.as_ref(), record);
            self.debug(&record.slot, || "after start".to_string());
        }
        record.started.release();
    }

    /// Mark `record` as retiring and schedule its teardown behind its start
    /// latch. The returned latch releases when teardown has finished.
    fn begin_stop(&self, record: Rc<SubscriptionRecord>, stop_driving: bool) -> Latch {
        record.retiring.set(true);
        let done = Latch::new();
        let finished = done.clone();
        let this = self.clone();
        let started = record.started.clone();
        started.when_released(move || {
            untracked(|| this.finish_stop(&record, stop_driving));
            finished.release();
        });
        done
    }

    fn finish_stop(&self, record: &SubscriptionRecord, stop_driving: bool) {
        let slot_id = record.slot.as_str();
        let handle = record.handle();
        let real = handle.as_ref().map_or(false, |h| !h.is_synthetic());
        let options = self.slot_options(slot_id);

        if real {
            self.debug(slot_id, || format!("stopping {}", record.args_json()));
            self.call_hook(options.as_ref().and_then(|o| o.before_stop.as_ref()), record);
        }
        if let Some(handle) = &handle {
            handle.stop();
        }
        if stop_driving {
            record.driving.stop();
        }
        let ready_computation = record.ready_computation.borrow_mut().take();
        match ready_computation {
            Some(computation) => computation.stop(),
            None => self.inner.context.diagnostics.warn(
                Some(self.label()),
                Some(slot_id),
                "readiness watcher missing while stopping",
            ),
        }

        {
            let mut state = self.inner.state.borrow_mut();
            state.records.remove(&record.index);
            if let Some(slot) = state.registry.get_mut(slot_id) {
                if stop_driving {
                    slot.started = false;
                    if slot.current.get_untracked() == Some(record.index) {
                        slot.current.set(None);
                    }
                }
            }
        }

        if real {
            self.call_hook(options.as_ref().and_then(|o| o.after_stop.as_ref()), record);
            self.debug(slot_id, || "stopped".to_string());
        }
    }

    fn call_hook(&self, hook: Option<&SlotHook>, record: &SubscriptionRecord) {
        let (Some(hook), Some(component)) = (hook, self.component()) else {
            return;
        };
        untracked(|| hook(&component, &record.slot, &record.args));
    }

    fn debug<F>(&self, slot_id: &str, message: F)
    where
        F: FnOnce() -> String,
    {
        self.inner
            .context
            .diagnostics
            .debug(Some(self.label()), Some(slot_id), message);
    }
}

/// Split evaluated args into the subscription name and its parameters.
/// A non-string name is used in its JSON form.
fn split_name(args: &Args) -> (String, &[Value]) {
    match args.split_first() {
        Some((Value::String(name), params)) => (name.clone(), params),
        Some((name, params)) => (name.to_string(), params),
        None => (String::new(), &[]),
    }
}

impl fmt::Debug for CachedSubscriptionInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("CachedSubscriptionInstance")
            .field("component", &self.inner.label)
            .field("slots", &state.registry.ids())
            .field("records", &state.records.len())
            .finish()
    }
}
