//! Slots: named subscription declarations on a component instance.
//!
//! A slot pairs an [`ArgSpec`] (the subscription name and its arguments,
//! any of which may be computed reactively from the component) with
//! [`SlotOptions`]. The [`SlotRegistry`] keeps one component instance's
//! slots in declaration order, which is also the order readiness is
//! aggregated in.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde_json::Value;
use smallvec::SmallVec;

use crate::component::ComponentInstance;
use crate::reactive::Signal;

/// Concrete argument values of one run. The first element is the
/// subscription name.
pub type Args = SmallVec<[Value; 4]>;

/// Reactive argument: evaluated on every run of the driving computation.
pub type Getter = Rc<dyn Fn(&ComponentInstance) -> Value>;

/// Lifecycle hook: `(component, slot id, args)`.
pub type SlotHook = Rc<dyn Fn(&ComponentInstance, &str, &[Value])>;

/// Decides whether a run's parameters (the args after the name) are
/// complete enough to subscribe with.
pub type ArgValidity = Rc<dyn Fn(&[Value]) -> bool>;

/// One element of an argument spec.
#[derive(Clone)]
pub enum Arg {
    Value(Value),
    Getter(Getter),
}

impl Arg {
    fn evaluate(&self, component: &ComponentInstance) -> Value {
        match self {
            Arg::Value(value) => value.clone(),
            Arg::Getter(getter) => getter(component),
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(value) => write!(f, "{value}"),
            Arg::Getter(_) => f.write_str("<getter>"),
        }
    }
}

/// Ordered argument spec: subscription name first, then its arguments.
///
/// ```rust
/// use serde_json::json;
/// use subs_cache_core::ArgSpec;
///
/// let spec = ArgSpec::new("posts")
///     .arg(json!({ "limit": 10 }))
///     .getter(|component| json!(component.type_name()));
/// assert_eq!(spec.len(), 3);
/// ```
#[derive(Clone, Default, Debug)]
pub struct ArgSpec {
    args: Vec<Arg>,
}

impl ArgSpec {
    /// Start a spec for the subscription `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            args: vec![Arg::Value(Value::String(name.into()))],
        }
    }

    /// A spec whose subscription name is itself computed reactively.
    pub fn named_by<F>(name: F) -> Self
    where
        F: Fn(&ComponentInstance) -> Value + 'static,
    {
        Self {
            args: vec![Arg::Getter(Rc::new(name))],
        }
    }

    /// Build from raw elements; the first one is the name.
    pub fn from_args(args: Vec<Arg>) -> Self {
        Self { args }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(Arg::Value(value.into()));
        self
    }

    pub fn getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&ComponentInstance) -> Value + 'static,
    {
        self.args.push(Arg::Getter(Rc::new(getter)));
        self
    }

    /// Append an already shared getter, e.g. one built by
    /// [`params`](crate::params).
    pub fn shared_getter(mut self, getter: Getter) -> Self {
        self.args.push(Arg::Getter(getter));
        self
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Evaluate every element. Getter reads are tracked by the caller's
    /// computation.
    pub fn evaluate(&self, component: &ComponentInstance) -> Args {
        self.args.iter().map(|arg| arg.evaluate(component)).collect()
    }
}

/// Per-slot lifecycle configuration.
#[derive(Clone)]
pub struct SlotOptions {
    /// Start from the created hook (`true`) or the rendered hook.
    pub start_on_created: bool,
    /// TTL override in minutes; `None` falls back to the cache's default.
    pub expire_after: Option<f64>,
    pub before_start: Option<SlotHook>,
    pub after_start: Option<SlotHook>,
    pub on_ready: Option<SlotHook>,
    pub before_stop: Option<SlotHook>,
    pub after_stop: Option<SlotHook>,
    pub arg_validity: ArgValidity,
    /// Replace the component's readiness predicate with the cached
    /// aggregate when the cached instance is created.
    pub replace_readiness_check: bool,
    /// When replacing, include ancestor components' readiness.
    pub replace_readiness_check_include_ancestors: bool,
}

impl Default for SlotOptions {
    fn default() -> Self {
        Self {
            start_on_created: true,
            expire_after: None,
            before_start: None,
            after_start: None,
            on_ready: None,
            before_stop: None,
            after_stop: None,
            arg_validity: Rc::new(|_| true),
            replace_readiness_check: true,
            replace_readiness_check_include_ancestors: true,
        }
    }
}

impl SlotOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defer the start to the rendered hook.
    pub fn start_on_rendered(mut self) -> Self {
        self.start_on_created = false;
        self
    }

    pub fn expire_after(mut self, minutes: f64) -> Self {
        self.expire_after = Some(minutes);
        self
    }

    pub fn before_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ComponentInstance, &str, &[Value]) + 'static,
    {
        self.before_start = Some(Rc::new(hook));
        self
    }

    pub fn after_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ComponentInstance, &str, &[Value]) + 'static,
    {
        self.after_start = Some(Rc::new(hook));
        self
    }

    pub fn on_ready<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ComponentInstance, &str, &[Value]) + 'static,
    {
        self.on_ready = Some(Rc::new(hook));
        self
    }

    pub fn before_stop<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ComponentInstance, &str, &[Value]) + 'static,
    {
        self.before_stop = Some(Rc::new(hook));
        self
    }

    pub fn after_stop<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ComponentInstance, &str, &[Value]) + 'static,
    {
        self.after_stop = Some(Rc::new(hook));
        self
    }

    /// Only subscribe while `predicate` accepts the parameters.
    pub fn valid_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&[Value]) -> bool + 'static,
    {
        self.arg_validity = Rc::new(predicate);
        self
    }

    /// Leave the component's readiness predicate alone.
    pub fn keep_readiness_check(mut self) -> Self {
        self.replace_readiness_check = false;
        self
    }

    /// Replace the readiness predicate without the ancestor walk.
    pub fn readiness_without_ancestors(mut self) -> Self {
        self.replace_readiness_check_include_ancestors = false;
        self
    }
}

impl fmt::Debug for SlotOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotOptions")
            .field("start_on_created", &self.start_on_created)
            .field("expire_after", &self.expire_after)
            .field("before_start", &self.before_start.is_some())
            .field("after_start", &self.after_start.is_some())
            .field("on_ready", &self.on_ready.is_some())
            .field("before_stop", &self.before_stop.is_some())
            .field("after_stop", &self.after_stop.is_some())
            .field("replace_readiness_check", &self.replace_readiness_check)
            .field(
                "replace_readiness_check_include_ancestors",
                &self.replace_readiness_check_include_ancestors,
            )
            .finish()
    }
}

/// Identity of one declaration (one `prepare_cached_subscription` call).
/// Used to tell whose hooks own a slot when two declarations collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

impl RegistrationId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RegistrationId {
    fn default() -> Self {
        Self::new()
    }
}

/// One registered slot on a component instance.
pub(crate) struct Slot {
    pub(crate) spec: Rc<ArgSpec>,
    pub(crate) options: Rc<SlotOptions>,
    pub(crate) owner: RegistrationId,
    pub(crate) allowed_to_start: bool,
    pub(crate) start_was_called: bool,
    pub(crate) started: bool,
    /// Monotonic index of the active record, if any.
    pub(crate) current: Signal<Option<u64>>,
}

/// Slots of one component instance, in declaration order.
pub(crate) struct SlotRegistry {
    slots: IndexMap<String, Slot>,
    version: Signal<u64>,
}

impl SlotRegistry {
    pub(crate) fn new() -> Self {
        Self {
            slots: IndexMap::new(),
            version: Signal::new(0),
        }
    }

    /// Add a slot. Returns false, changing nothing, if the id is taken.
    pub(crate) fn register(
        &mut self,
        id: &str,
        spec: Rc<ArgSpec>,
        options: Rc<SlotOptions>,
        owner: RegistrationId,
    ) -> bool {
        if self.slots.contains_key(id) {
            return false;
        }
        self.slots.insert(
            id.to_owned(),
            Slot {
                spec,
                options,
                owner,
                allowed_to_start: true,
                start_was_called: false,
                started: false,
                current: Signal::new(None),
            },
        );
        self.version.update(|v| v + 1);
        true
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Slot> {
        self.slots.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Slot> {
        self.slots.get_mut(id)
    }

    /// Slot ids in declaration order. Tracked: a later registration
    /// re-runs whoever iterated.
    pub(crate) fn ids(&self) -> Vec<String> {
        self.version.get();
        self.slots.keys().cloned().collect()
    }
}
