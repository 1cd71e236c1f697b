//! Component types: the declaration side of the component framework.
//!
//! A [`ComponentType`] collects lifecycle hooks and helpers. Every instance
//! created from it runs the hooks registered so far, in registration order.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::helpers::{Helper, Helpers};
use super::ComponentInstance;
use crate::error::Result;

/// A lifecycle hook.
pub type LifecycleHook = Rc<dyn Fn(&ComponentInstance) -> Result<()>>;

/// Handle to a component type. Clones share hooks and helpers.
#[derive(Clone)]
pub struct ComponentType {
    inner: Rc<TypeInner>,
}

struct TypeInner {
    name: String,
    is_component: bool,
    created: RefCell<Vec<LifecycleHook>>,
    rendered: RefCell<Vec<LifecycleHook>>,
    destroyed: RefCell<Vec<LifecycleHook>>,
    helpers: RefCell<Helpers>,
}

impl ComponentType {
    /// A component type.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_kind(name.into(), true)
    }

    /// A non-component view node (a conditional or loop block). Blocks sit
    /// in the parent chain but are skipped when walking ancestors.
    pub fn block(name: impl Into<String>) -> Self {
        Self::with_kind(name.into(), false)
    }

    fn with_kind(name: String, is_component: bool) -> Self {
        Self {
            inner: Rc::new(TypeInner {
                name,
                is_component,
                created: RefCell::new(Vec::new()),
                rendered: RefCell::new(Vec::new()),
                destroyed: RefCell::new(Vec::new()),
                helpers: RefCell::new(Helpers::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_component(&self) -> bool {
        self.inner.is_component
    }

    pub fn on_created<F>(&self, hook: F)
    where
        F: Fn(&ComponentInstance) -> Result<()> + 'static,
    {
        self.inner.created.borrow_mut().push(Rc::new(hook));
    }

    pub fn on_rendered<F>(&self, hook: F)
    where
        F: Fn(&ComponentInstance) -> Result<()> + 'static,
    {
        self.inner.rendered.borrow_mut().push(Rc::new(hook));
    }

    pub fn on_destroyed<F>(&self, hook: F)
    where
        F: Fn(&ComponentInstance) -> Result<()> + 'static,
    {
        self.inner.destroyed.borrow_mut().push(Rc::new(hook));
    }

    /// Register a batch of helpers on this type.
    pub fn helpers(&self, helpers: Helpers) {
        self.inner.helpers.borrow_mut().extend(helpers);
    }

    pub fn helper(&self, name: &str) -> Option<Helper> {
        self.inner.helpers.borrow().get(name)
    }

    // Hook lists are snapshotted so a hook may register further hooks
    // without invalidating the iteration.
    pub(crate) fn created_hooks(&self) -> Vec<LifecycleHook> {
        self.inner.created.borrow().clone()
    }

    pub(crate) fn rendered_hooks(&self) -> Vec<LifecycleHook> {
        self.inner.rendered.borrow().clone()
    }

    pub(crate) fn destroyed_hooks(&self) -> Vec<LifecycleHook> {
        self.inner.destroyed.borrow().clone()
    }

    pub(crate) fn call_helper(
        &self,
        name: &str,
        instance: &ComponentInstance,
        args: &[Value],
    ) -> Option<Value> {
        let helper = self.helper(name)?;
        Some(helper(instance, args))
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.inner.name)
            .field("is_component", &self.inner.is_component)
            .field("helpers", &*self.inner.helpers.borrow())
            .finish()
    }
}
