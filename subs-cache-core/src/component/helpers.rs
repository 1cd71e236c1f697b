//! Named computed accessors exposed to templates.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use super::ComponentInstance;

/// A helper: computed from the calling instance and positional arguments.
pub type Helper = Rc<dyn Fn(&ComponentInstance, &[Value]) -> Value>;

/// An ordered set of helpers.
#[derive(Clone, Default)]
pub struct Helpers {
    map: IndexMap<String, Helper>,
}

impl Helpers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a helper, replacing any previous one of the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, helper: F)
    where
        F: Fn(&ComponentInstance, &[Value]) -> Value + 'static,
    {
        self.map.insert(name.into(), Rc::new(helper));
    }

    pub fn get(&self, name: &str) -> Option<Helper> {
        self.map.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub(crate) fn extend(&mut self, other: Helpers) {
        self.map.extend(other.map);
    }
}

impl fmt::Debug for Helpers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.map.keys()).finish()
    }
}
