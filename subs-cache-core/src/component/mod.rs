//! Component framework
//!
//! The slice of a UI component system the subscription cache needs: types
//! that collect created/rendered/destroyed hooks and helpers, and instances
//! that run those hooks, know their parent chain, own a few subscriptions
//! of their own and expose a readiness predicate.
//!
//! Instances are explicit handles. Nothing here looks up a "current"
//! instance ambiently; whoever runs a hook passes the instance in.

mod helpers;
mod instance;
mod kind;

pub use helpers::{Helper, Helpers};
pub use instance::{ComponentId, ComponentInstance, ReadinessMode, WeakComponent};
pub use kind::{ComponentType, LifecycleHook};
