//! The cache manager: process-wide entry point.
//!
//! Owns the diagnostics shared by every cache, the default subscriptions,
//! a replaceable default [`SlotCache`] and the global readiness helpers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::binder::SlotCache;
use crate::component::{ComponentInstance, Helpers};
use crate::config::{CacheOptions, Diagnostics, LogSink};
use crate::defaults::DefaultSubscriptions;
use crate::error::Result;
use crate::reactive::Computation;
use crate::readiness::{are_all_subs_ready, WhenAllSubsReady};
use crate::subscription::SubscriptionCache;

/// Helper answering `allSubsReady()` for the calling component.
pub const ALL_SUBS_READY: &str = "allSubsReady";
/// Helper answering `defaultSubscriptionIsReady(name)`.
pub const DEFAULT_SUBSCRIPTION_IS_READY: &str = "defaultSubscriptionIsReady";
/// Helper answering `defaultSubscriptionsAllReady()`.
pub const DEFAULT_SUBSCRIPTIONS_ALL_READY: &str = "defaultSubscriptionsAllReady";

/// Builds the external subscription cache for a set of options.
pub type CacheFactory = Rc<dyn Fn(&CacheOptions) -> Rc<dyn SubscriptionCache>>;

/// Entry point for making slot caches and querying global readiness.
///
/// ```rust,ignore
/// let manager = CacheManager::new(|options| Rc::new(MyCache::new(options)));
/// manager.default_cache().prepare_cached_subscription(
///     &[&list_type],
///     "posts",
///     ArgSpec::new("posts").getter(|c| page_of(c)),
///     SlotOptions::default(),
/// )?;
/// ```
pub struct CacheManager {
    factory: CacheFactory,
    diagnostics: Rc<Diagnostics>,
    defaults: Rc<DefaultSubscriptions>,
    default_cache: RefCell<SlotCache>,
    helpers: Helpers,
}

impl CacheManager {
    /// Create a manager whose default cache uses [`CacheOptions::default`].
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&CacheOptions) -> Rc<dyn SubscriptionCache> + 'static,
    {
        let factory: CacheFactory = Rc::new(factory);
        let diagnostics = Rc::new(Diagnostics::new());
        let defaults = Rc::new(DefaultSubscriptions::new());
        let options = CacheOptions::default();
        let default_cache = SlotCache::new(
            factory(&options),
            options,
            defaults.clone(),
            diagnostics.clone(),
        );
        let helpers = global_helpers(defaults.clone());

        Self {
            factory,
            diagnostics,
            defaults,
            default_cache: RefCell::new(default_cache),
            helpers,
        }
    }

    /// Make a new, independent slot cache.
    pub fn make_cache(&self, options: CacheOptions) -> SlotCache {
        tracing::debug!(?options, "cache_manager.make_cache");
        SlotCache::new(
            (self.factory)(&options),
            options,
            self.defaults.clone(),
            self.diagnostics.clone(),
        )
    }

    pub fn default_cache(&self) -> SlotCache {
        self.default_cache.borrow().clone()
    }

    /// Swap the default cache for one made with `options`. Slots declared
    /// on the previous default keep using it.
    pub fn replace_default_cache(&self, options: CacheOptions) -> SlotCache {
        let cache = self.make_cache(options);
        *self.default_cache.borrow_mut() = cache.clone();
        cache
    }

    pub fn debug_mode(&self) -> bool {
        self.diagnostics.debug_mode()
    }

    pub fn set_debug_mode(&self, on: bool) {
        self.diagnostics.set_debug_mode(on);
    }

    /// Route diagnostic lines to `sink` as well as `tracing`.
    pub fn set_logger(&self, sink: Option<LogSink>) {
        self.diagnostics.set_logger(sink);
    }

    pub fn diagnostics(&self) -> Rc<Diagnostics> {
        self.diagnostics.clone()
    }

    pub fn defaults(&self) -> Rc<DefaultSubscriptions> {
        self.defaults.clone()
    }

    /// Subscribe to `name` for the life of the process through the default
    /// cache.
    pub fn add_default_subscription(&self, name: &str) {
        let cache = self.default_cache.borrow().cache();
        self.defaults.add(&*cache, name);
    }

    /// Helpers every component can call: `allSubsReady`,
    /// `defaultSubscriptionIsReady` and `defaultSubscriptionsAllReady`.
    pub fn global_helpers(&self) -> &Helpers {
        &self.helpers
    }

    /// Everything `instance` depends on is ready.
    pub fn are_all_subs_ready(&self, instance: &ComponentInstance) -> bool {
        are_all_subs_ready(instance, &self.defaults)
    }

    /// Install `callbacks` on `instance`; see [`WhenAllSubsReady`].
    pub fn when_all_subs_ready(
        &self,
        instance: &ComponentInstance,
        callbacks: WhenAllSubsReady,
    ) -> Result<Computation> {
        callbacks.install(instance, self.defaults.clone())
    }
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("diagnostics", &self.diagnostics)
            .field("defaults", &self.defaults)
            .field("default_cache", &*self.default_cache.borrow())
            .finish()
    }
}

fn global_helpers(defaults: Rc<DefaultSubscriptions>) -> Helpers {
    let mut helpers = Helpers::new();

    let d = defaults.clone();
    helpers.register(ALL_SUBS_READY, move |instance, _| {
        Value::Bool(are_all_subs_ready(instance, &d))
    });

    let d = defaults.clone();
    helpers.register(DEFAULT_SUBSCRIPTION_IS_READY, move |_, args| {
        let Some(name) = args.first().and_then(Value::as_str) else {
            return Value::Bool(false);
        };
        match d.is_ready(name) {
            Ok(ready) => Value::Bool(ready),
            Err(err) => {
                tracing::warn!(error = %err, "helpers.default_subscription_is_ready");
                Value::Bool(false)
            }
        }
    });

    helpers.register(DEFAULT_SUBSCRIPTIONS_ALL_READY, move |_, _| {
        Value::Bool(defaults.all_ready())
    });

    helpers
}
