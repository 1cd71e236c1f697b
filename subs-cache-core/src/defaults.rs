//! Default subscriptions.
//!
//! Publications every screen needs (the current user, app settings, ...)
//! are subscribed once, for the life of the process, and take part in every
//! component's "all subscriptions ready" answer.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::reactive::Signal;
use crate::readiness::all_ready;
use crate::subscription::{SubscriptionCache, SubscriptionHandle};

/// Process-lifetime subscriptions shared by every component.
pub struct DefaultSubscriptions {
    subs: RefCell<IndexMap<String, Rc<dyn SubscriptionHandle>>>,
    presence: Signal<u64>,
}

impl DefaultSubscriptions {
    pub fn new() -> Self {
        Self {
            subs: RefCell::new(IndexMap::new()),
            presence: Signal::new(0),
        }
    }

    /// Subscribe to `name` with no arguments. Adding a name twice keeps the
    /// first subscription.
    pub fn add(&self, cache: &dyn SubscriptionCache, name: &str) {
        if self.subs.borrow().contains_key(name) {
            tracing::debug!(publication = name, "default_subscriptions.already_added");
            return;
        }
        let handle = cache.subscribe(name, &[]);
        self.subs.borrow_mut().insert(name.to_owned(), handle);
        self.presence.update(|v| v + 1);
    }

    /// Readiness of one default subscription.
    pub fn is_ready(&self, name: &str) -> Result<bool> {
        self.presence.get();
        let handle = self.subs.borrow().get(name).cloned();
        match handle {
            Some(handle) => Ok(handle.ready()),
            None => Err(Error::NoSuchDefaultSubscription(name.to_owned())),
        }
    }

    pub fn subscription_names(&self) -> Vec<String> {
        self.presence.get();
        self.subs.borrow().keys().cloned().collect()
    }

    /// True when every default subscription is ready. Every handle is read.
    pub fn all_ready(&self) -> bool {
        self.presence.get();
        let handles: Vec<_> = self.subs.borrow().values().cloned().collect();
        all_ready(handles.iter().map(|handle| handle.ready()))
    }
}

impl Default for DefaultSubscriptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultSubscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultSubscriptions")
            .field("names", &self.subs.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    struct Pub {
        ready: Signal<bool>,
    }

    impl SubscriptionHandle for Pub {
        fn ready(&self) -> bool {
            self.ready.get()
        }

        fn stop(&self) {}
    }

    #[derive(Default)]
    struct Source {
        handles: RefCell<IndexMap<String, Rc<Pub>>>,
    }

    impl SubscriptionCache for Source {
        fn subscribe(&self, name: &str, _args: &[Value]) -> Rc<dyn SubscriptionHandle> {
            let handle = Rc::new(Pub { ready: Signal::new(false) });
            self.handles.borrow_mut().insert(name.to_owned(), handle.clone());
            handle
        }

        fn subscribe_with_ttl(&self, _ttl: f64, name: &str, args: &[Value]) -> Rc<dyn SubscriptionHandle> {
            self.subscribe(name, args)
        }
    }

    #[test]
    fn tracks_each_default_subscription() {
        let source = Source::default();
        let defaults = DefaultSubscriptions::new();
        assert!(defaults.all_ready());

        defaults.add(&source, "user");
        defaults.add(&source, "settings");
        defaults.add(&source, "user");
        assert_eq!(defaults.subscription_names(), vec!["user", "settings"]);
        assert_eq!(source.handles.borrow().len(), 2);

        assert_eq!(defaults.is_ready("user"), Ok(false));
        assert!(!defaults.all_ready());

        source.handles.borrow()["user"].ready.set(true);
        source.handles.borrow()["settings"].ready.set(true);
        assert_eq!(defaults.is_ready("user"), Ok(true));
        assert!(defaults.all_ready());
    }

    #[test]
    fn unknown_name_is_an_error() {
        let defaults = DefaultSubscriptions::new();
        assert_eq!(
            defaults.is_ready("nope"),
            Err(Error::NoSuchDefaultSubscription("nope".into()))
        );
    }
}
