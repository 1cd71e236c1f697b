//! Readiness aggregation.
//!
//! Every aggregate here is a non-short-circuit AND: each operand is
//! evaluated even after the result is known to be false. Each operand is a
//! tracked read, and skipping one would drop a dependency, leaving the
//! aggregate stale when the skipped operand later becomes ready.

use std::rc::Rc;

use crate::component::ComponentInstance;
use crate::defaults::DefaultSubscriptions;
use crate::error::Result;
use crate::reactive::Computation;

/// AND over every reading, consuming the whole iterator.
pub fn all_ready<I>(readings: I) -> bool
where
    I: IntoIterator<Item = bool>,
{
    readings.into_iter().fold(true, |acc, ready| acc & ready)
}

/// Everything `instance` depends on, excluding ancestors.
///
/// With a cached-subscription instance attached this is its aggregate;
/// otherwise the component's own readiness AND the default subscriptions.
pub fn are_all_subs_ready(instance: &ComponentInstance, defaults: &DefaultSubscriptions) -> bool {
    match instance.cached_subscriptions() {
        Some(cached) => cached.all_subs_ready(),
        None => all_ready([instance.subscriptions_ready(), defaults.all_ready()]),
    }
}

type Callback = Box<dyn Fn(&ComponentInstance, &Computation)>;

/// Runs a body once a component's subscriptions are all ready.
///
/// Installs an instance-scoped computation. On each run it calls `before`,
/// then, if everything is ready, the body followed by a self-stop, then
/// `after`. The body therefore runs at most once.
pub struct WhenAllSubsReady {
    body: Callback,
    before: Option<Callback>,
    after: Option<Callback>,
}

impl WhenAllSubsReady {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&ComponentInstance, &Computation) + 'static,
    {
        Self {
            body: Box::new(body),
            before: None,
            after: None,
        }
    }

    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&ComponentInstance, &Computation) + 'static,
    {
        self.before = Some(Box::new(f));
        self
    }

    pub fn after<F>(mut self, f: F) -> Self
    where
        F: Fn(&ComponentInstance, &Computation) + 'static,
    {
        self.after = Some(Box::new(f));
        self
    }

    pub fn install(
        self,
        instance: &ComponentInstance,
        defaults: Rc<DefaultSubscriptions>,
    ) -> Result<Computation> {
        let target = instance.downgrade();
        instance.autorun(move |c| {
            let Some(instance) = target.upgrade() else {
                c.stop();
                return Ok(());
            };
            if let Some(before) = &self.before {
                before(&instance, c);
            }
            if are_all_subs_ready(&instance, &defaults) {
                (self.body)(&instance, c);
                c.stop();
            }
            if let Some(after) = &self.after {
                after(&instance, c);
            }
            Ok(())
        })
    }
}
