//! Boundary to the external subscription cache.
//!
//! The process-wide cache that deduplicates `(name, args)` subscriptions and
//! expires them after release is consumed, not built, by this crate. It is
//! reached through [`SubscriptionCache`]. Handles it returns are wrapped in a
//! [`SlotHandle`], whose `Synthetic` variant stands in for subscriptions that
//! are deliberately withheld because their arguments are not valid yet.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// A live subscription returned by the cache.
pub trait SubscriptionHandle {
    /// Whether all initial data has arrived. Must be a reactive read.
    fn ready(&self) -> bool;

    /// Release the subscription.
    fn stop(&self);
}

/// The shared subscription cache.
pub trait SubscriptionCache {
    /// Subscribe using the cache's own expiry policy.
    fn subscribe(&self, name: &str, args: &[Value]) -> Rc<dyn SubscriptionHandle>;

    /// Subscribe, keeping the subscription alive for `ttl_minutes` after its
    /// last release.
    fn subscribe_with_ttl(
        &self,
        ttl_minutes: f64,
        name: &str,
        args: &[Value],
    ) -> Rc<dyn SubscriptionHandle>;
}

/// Handle held by a subscription record.
#[derive(Clone)]
pub enum SlotHandle {
    /// A subscription issued through the cache.
    Real(Rc<dyn SubscriptionHandle>),
    /// No subscription was issued; always ready, stopping does nothing.
    Synthetic,
}

impl SlotHandle {
    pub fn ready(&self) -> bool {
        match self {
            SlotHandle::Real(handle) => handle.ready(),
            SlotHandle::Synthetic => true,
        }
    }

    pub fn stop(&self) {
        match self {
            SlotHandle::Real(handle) => handle.stop(),
            SlotHandle::Synthetic => {}
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, SlotHandle::Synthetic)
    }
}

impl fmt::Debug for SlotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotHandle::Real(_) => f.write_str("SlotHandle::Real"),
            SlotHandle::Synthetic => f.write_str("SlotHandle::Synthetic"),
        }
    }
}
