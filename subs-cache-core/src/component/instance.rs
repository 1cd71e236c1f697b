//! Component instances.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use super::helpers::Helpers;
use super::kind::ComponentType;
use crate::error::{Error, Result};
use crate::instance::CachedSubscriptionInstance;
use crate::reactive::{Computation, Signal};
use crate::readiness::all_ready;
use crate::subscription::SubscriptionHandle;

/// Process-wide identity of a component instance, assigned at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which predicate `subscriptions_ready` answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadinessMode {
    /// Only the component's own (non-cache) subscriptions.
    #[default]
    Own,
    /// The cached-subscription aggregate for this component.
    Cached,
    /// The cached aggregate AND every ancestor component's readiness.
    CachedWithAncestors,
}

/// Handle to a live component instance. Clones refer to the same instance.
#[derive(Clone)]
pub struct ComponentInstance {
    inner: Rc<InstanceInner>,
}

/// Non-owning handle to a component instance.
#[derive(Clone)]
pub struct WeakComponent {
    inner: Weak<InstanceInner>,
}

impl WeakComponent {
    pub fn upgrade(&self) -> Option<ComponentInstance> {
        self.inner.upgrade().map(|inner| ComponentInstance { inner })
    }
}

struct InstanceInner {
    id: ComponentId,
    kind: ComponentType,
    parent: Option<ComponentInstance>,
    destroyed: Cell<bool>,
    own_subscriptions: RefCell<Vec<Rc<dyn SubscriptionHandle>>>,
    own_version: Signal<u64>,
    readiness: Cell<ReadinessMode>,
    cached: RefCell<Option<CachedSubscriptionInstance>>,
    autoruns: RefCell<Vec<Computation>>,
}

impl ComponentInstance {
    /// Instantiate `kind` under `parent` and run its created hooks.
    pub fn create(kind: &ComponentType, parent: Option<&ComponentInstance>) -> Result<Self> {
        let instance = Self {
            inner: Rc::new(InstanceInner {
                id: ComponentId::next(),
                kind: kind.clone(),
                parent: parent.cloned(),
                destroyed: Cell::new(false),
                own_subscriptions: RefCell::new(Vec::new()),
                own_version: Signal::new(0),
                readiness: Cell::new(ReadinessMode::Own),
                cached: RefCell::new(None),
                autoruns: RefCell::new(Vec::new()),
            }),
        };

        for hook in kind.created_hooks() {
            hook(&instance)?;
        }
        Ok(instance)
    }

    /// Run the rendered hooks. Does nothing once destroyed.
    pub fn render(&self) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        for hook in self.inner.kind.rendered_hooks() {
            hook(self)?;
        }
        Ok(())
    }

    /// Tear the instance down.
    ///
    /// Marks the instance destroyed first, runs every destroyed hook (a
    /// failing hook does not skip the rest; the first error is returned),
    /// then stops the instance's autoruns and own subscriptions. Calling it
    /// again is a no-op.
    pub fn destroy(&self) -> Result<()> {
        if self.inner.destroyed.replace(true) {
            return Ok(());
        }

        let mut first = None;
        for hook in self.inner.kind.destroyed_hooks() {
            if let Err(err) = hook(self) {
                first.get_or_insert(err);
            }
        }

        let autoruns = std::mem::take(&mut *self.inner.autoruns.borrow_mut());
        for computation in autoruns {
            computation.stop();
        }
        let subscriptions = std::mem::take(&mut *self.inner.own_subscriptions.borrow_mut());
        for handle in subscriptions {
            handle.stop();
        }

        first.map_or(Ok(()), Err)
    }

    pub fn id(&self) -> ComponentId {
        self.inner.id
    }

    pub fn component_type(&self) -> &ComponentType {
        &self.inner.kind
    }

    pub fn type_name(&self) -> &str {
        self.inner.kind.name()
    }

    /// `TypeName|instance-id`, used to tag log lines.
    pub fn label(&self) -> String {
        format!("{}|{}", self.type_name(), self.inner.id.raw())
    }

    pub fn is_component(&self) -> bool {
        self.inner.kind.is_component()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    pub fn parent(&self) -> Option<&ComponentInstance> {
        self.inner.parent.as_ref()
    }

    /// Component ancestors, nearest first. Block nodes are skipped.
    pub fn ancestors(&self) -> Vec<ComponentInstance> {
        let mut ancestors = Vec::new();
        let mut current = self.parent();
        while let Some(node) = current {
            if node.is_component() {
                ancestors.push(node.clone());
            }
            current = node.parent();
        }
        ancestors
    }

    pub fn downgrade(&self) -> WeakComponent {
        WeakComponent {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &ComponentInstance) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// A computation scoped to this instance; stopped on destroy.
    pub fn autorun<F>(&self, f: F) -> Result<Computation>
    where
        F: Fn(&Computation) -> Result<()> + 'static,
    {
        let computation = Computation::new(f)?;
        if self.is_destroyed() {
            computation.stop();
        } else {
            self.inner.autoruns.borrow_mut().push(computation.clone());
        }
        Ok(computation)
    }

    /// Track a subscription the component made on its own, outside the
    /// cache. It is stopped when the instance is destroyed.
    pub fn add_own_subscription(&self, handle: Rc<dyn SubscriptionHandle>) {
        self.inner.own_subscriptions.borrow_mut().push(handle);
        self.inner.own_version.update(|v| v + 1);
    }

    /// Readiness of the component's own subscriptions.
    pub fn own_subscriptions_ready(&self) -> bool {
        self.inner.own_version.get();
        let handles = self.inner.own_subscriptions.borrow().clone();
        all_ready(handles.iter().map(|handle| handle.ready()))
    }

    pub fn readiness_mode(&self) -> ReadinessMode {
        self.inner.readiness.get()
    }

    pub fn set_readiness_mode(&self, mode: ReadinessMode) {
        self.inner.readiness.set(mode);
    }

    /// The component's readiness, as selected by its [`ReadinessMode`].
    ///
    /// Modes that need a cached-subscription instance fall back to own
    /// readiness while none is attached.
    pub fn subscriptions_ready(&self) -> bool {
        let cached = self.cached_subscriptions();
        match (self.readiness_mode(), cached) {
            (ReadinessMode::Cached, Some(cached)) => cached.all_subs_ready(),
            (ReadinessMode::CachedWithAncestors, Some(cached)) => {
                cached.all_subs_ready_including_ancestors()
            }
            _ => self.own_subscriptions_ready(),
        }
    }

    /// The cached-subscription instance, if a slot was ever registered.
    pub fn cached_subscriptions(&self) -> Option<CachedSubscriptionInstance> {
        self.inner.cached.borrow().clone()
    }

    /// Like [`cached_subscriptions`](Self::cached_subscriptions), failing
    /// with [`Error::NotAttached`] when none is attached.
    pub fn require_cached_subscriptions(&self) -> Result<CachedSubscriptionInstance> {
        self.cached_subscriptions()
            .ok_or(Error::NotAttached(self.inner.id))
    }

    /// Get the attached cached-subscription instance, creating it with
    /// `init` on first use. The flag is true when it was just created.
    pub(crate) fn cached_subscriptions_or_init<F>(&self, init: F) -> (CachedSubscriptionInstance, bool)
    where
        F: FnOnce() -> CachedSubscriptionInstance,
    {
        if let Some(existing) = self.cached_subscriptions() {
            return (existing, false);
        }
        let created = init();
        *self.inner.cached.borrow_mut() = Some(created.clone());
        (created, true)
    }

    /// Call a helper by name: the type's own helpers first, then `globals`.
    pub fn call_helper(&self, name: &str, args: &[Value], globals: Option<&Helpers>) -> Option<Value> {
        if let Some(value) = self.inner.kind.call_helper(name, self, args) {
            return Some(value);
        }
        let helper = globals?.get(name)?;
        Some(helper(self, args))
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("id", &self.inner.id)
            .field("type", &self.type_name())
            .field("destroyed", &self.is_destroyed())
            .field("readiness", &self.readiness_mode())
            .finish()
    }
}
