//! Lifecycle binding: wiring slots into component types.
//!
//! [`SlotCache::prepare_cached_subscription`] installs, on each target
//! type, a created hook that registers the slot, a created (or rendered)
//! hook that starts it, a destroyed hook that stops it, and the per-type
//! readiness helpers.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::component::{ComponentInstance, ComponentType, Helpers, ReadinessMode};
use crate::config::{CacheOptions, Diagnostics};
use crate::defaults::DefaultSubscriptions;
use crate::error::{Error, Result};
use crate::instance::{CacheContext, CachedSubscriptionInstance};
use crate::reactive::Runtime;
use crate::slot::{ArgSpec, RegistrationId, SlotOptions};
use crate::subscription::SubscriptionCache;

/// Helper answering `cachedSubReady(slot_id)`.
pub const CACHED_SUB_READY: &str = "cachedSubReady";
/// Helper answering `allCachedSubsReady()`.
pub const ALL_CACHED_SUBS_READY: &str = "allCachedSubsReady";

/// Scheduler turns a start trigger waits for its slot to be registered.
const START_ATTEMPTS: u32 = 10;

/// A subscription cache bound to component lifecycles.
///
/// Made by [`CacheManager`](crate::CacheManager). Clones share the
/// underlying cache.
#[derive(Clone)]
pub struct SlotCache {
    context: CacheContext,
    options: CacheOptions,
}

impl SlotCache {
    pub(crate) fn new(
        cache: Rc<dyn SubscriptionCache>,
        options: CacheOptions,
        defaults: Rc<DefaultSubscriptions>,
        diagnostics: Rc<Diagnostics>,
    ) -> Self {
        Self {
            context: CacheContext {
                cache,
                default_ttl: options.expire_after,
                defaults,
                diagnostics,
            },
            options,
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// The underlying subscription cache.
    pub fn cache(&self) -> Rc<dyn SubscriptionCache> {
        self.context.cache.clone()
    }

    /// The component's cached-subscription instance, attached on first use.
    /// Attaching this way leaves the component's readiness mode alone.
    pub fn instance_for(&self, component: &ComponentInstance) -> CachedSubscriptionInstance {
        let context = self.context.clone();
        let (cached, _) = component
            .cached_subscriptions_or_init(|| CachedSubscriptionInstance::new(component, context));
        cached
    }

    /// Declare a cached subscription slot on every type in `targets`.
    ///
    /// Each instance of a target registers the slot when created and
    /// starts it when created (or rendered, per `options`). Destroying the
    /// instance stops it. If an instance already has a slot with this id
    /// the later declaration is excluded on that instance: a warning is
    /// logged and its hooks do nothing there.
    pub fn prepare_cached_subscription(
        &self,
        targets: &[&ComponentType],
        slot_id: &str,
        spec: ArgSpec,
        options: SlotOptions,
    ) -> Result<()> {
        if spec.is_empty() {
            return Err(Error::EmptyArgumentSpec(slot_id.to_owned()));
        }
        let registration = Registration {
            cache: self.clone(),
            slot_id: slot_id.to_owned(),
            spec: Rc::new(spec),
            options: Rc::new(options),
            owner: RegistrationId::new(),
        };
        let registration = Rc::new(registration);

        for target in targets {
            let r = registration.clone();
            target.on_created(move |instance| r.register(instance));

            let r = registration.clone();
            if registration.options.start_on_created {
                target.on_created(move |instance| r.check_and_start(instance, "onCreated", 1));
            } else {
                target.on_rendered(move |instance| r.check_and_start(instance, "onRendered", 1));
            }

            let r = registration.clone();
            target.on_destroyed(move |instance| r.stop_on_destroy(instance));

            target.helpers(readiness_helpers());
        }
        Ok(())
    }
}

impl fmt::Debug for SlotCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotCache")
            .field("options", &self.options)
            .finish()
    }
}

/// One `prepare_cached_subscription` declaration, shared by the hooks it
/// installs.
struct Registration {
    cache: SlotCache,
    slot_id: String,
    spec: Rc<ArgSpec>,
    options: Rc<SlotOptions>,
    owner: RegistrationId,
}

impl Registration {
    fn diagnostics(&self) -> &Diagnostics {
        &self.cache.context.diagnostics
    }

    fn register(&self, instance: &ComponentInstance) -> Result<()> {
        let context = self.cache.context.clone();
        let (cached, created) = instance
            .cached_subscriptions_or_init(|| CachedSubscriptionInstance::new(instance, context));
        if created && self.options.replace_readiness_check {
            instance.set_readiness_mode(if self.options.replace_readiness_check_include_ancestors {
                ReadinessMode::CachedWithAncestors
            } else {
                ReadinessMode::Cached
            });
        }
        cached.register_owned(&self.slot_id, self.spec.clone(), self.options.clone(), self.owner)?;
        Ok(())
    }

    /// Start the slot if the instance is still allowed to. Polls on later
    /// scheduler turns while the slot is not registered yet, giving up
    /// after [`START_ATTEMPTS`] turns.
    fn check_and_start(
        self: &Rc<Self>,
        instance: &ComponentInstance,
        trigger: &'static str,
        attempt: u32,
    ) -> Result<()> {
        if instance.is_destroyed() {
            return Ok(());
        }
        let label = instance.label();
        let registered = instance
            .cached_subscriptions()
            .and_then(|cached| cached.owner_of(&self.slot_id).map(|owner| (cached, owner)));
        let Some((cached, owner)) = registered else {
            if attempt >= START_ATTEMPTS {
                self.diagnostics().warn(
                    Some(label.as_str()),
                    Some(self.slot_id.as_str()),
                    format!("{trigger}: slot never registered; not starting"),
                );
                return Ok(());
            }
            self.diagnostics().debug(Some(label.as_str()), Some(self.slot_id.as_str()), || {
                format!("{trigger}: not registered yet; retrying")
            });
            let this = self.clone();
            let retry = instance.downgrade();
            Runtime::defer(move || match retry.upgrade() {
                Some(instance) => this.check_and_start(&instance, trigger, attempt + 1),
                None => Ok(()),
            });
            return Ok(());
        };
        if owner != self.owner {
            return Ok(());
        }

        self.diagnostics().debug(Some(label.as_str()), Some(self.slot_id.as_str()), || {
            format!("{}.{trigger}", instance.type_name())
        });
        if cached.allowed_to_start(&self.slot_id) {
            cached.start_sub(&self.slot_id)?;
            cached.mark_start_called(&self.slot_id);
        } else {
            self.diagnostics().info(
                Some(label.as_str()),
                Some(self.slot_id.as_str()),
                format!("{trigger} [PREVENTED!]"),
            );
        }
        Ok(())
    }

    fn stop_on_destroy(&self, instance: &ComponentInstance) -> Result<()> {
        let Some(cached) = instance.cached_subscriptions() else {
            return Ok(());
        };
        if cached.owner_of(&self.slot_id) != Some(self.owner) {
            return Ok(());
        }
        let label = instance.label();
        cached.disallow_start(&self.slot_id);

        if !cached.start_was_called(&self.slot_id) {
            self.diagnostics()
                .info(Some(label.as_str()), Some(self.slot_id.as_str()), "onDestroyed (Sub was never started.)");
            return Ok(());
        }
        self.diagnostics()
            .debug(Some(label.as_str()), Some(self.slot_id.as_str()), || "onDestroyed".to_string());
        match cached.stop_sub(&self.slot_id) {
            Ok(_) => Ok(()),
            Err(Error::NoActiveSubscription(_)) => {
                self.diagnostics()
                    .warn(Some(label.as_str()), Some(self.slot_id.as_str()), "onDestroyed: already stopped");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

fn readiness_helpers() -> Helpers {
    let mut helpers = Helpers::new();
    helpers.register(CACHED_SUB_READY, |instance, args| {
        let ready = match (instance.cached_subscriptions(), args.first().and_then(Value::as_str)) {
            (Some(cached), Some(slot_id)) => cached.slot_ready(slot_id),
            _ => false,
        };
        Value::Bool(ready)
    });
    helpers.register(ALL_CACHED_SUBS_READY, |instance, _| {
        Value::Bool(
            instance
                .cached_subscriptions()
                .map_or(false, |cached| cached.all_cached_slots_ready()),
        )
    });
    helpers
}
