//! Error types.
//!
//! Every fault here is a lifecycle misuse or a state-consistency violation.
//! None of them are retried; they surface at the point of detection, or
//! through the reactive runtime's error boundary when they are detected
//! inside a re-run, a deferred task or a latch continuation.

use thiserror::Error;

use crate::component::ComponentId;

/// Errors raised by the subscription cache and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// `start_sub` was called on a slot that is already started.
    #[error("subscription slot `{0}` is already started")]
    DuplicateStart(String),

    /// A started slot re-ran its driving computation but had no record.
    #[error("started subscription slot `{0}` has no subscription record")]
    MissingSubscriptionRecord(String),

    /// `stop_sub` was called on a slot with no active record.
    #[error("no started subscription for slot `{0}`")]
    NoActiveSubscription(String),

    /// The slot id was never registered on this component instance.
    #[error("unknown subscription slot `{0}`")]
    UnknownSlot(String),

    /// A slot was declared without a subscription name.
    #[error("argument spec for slot `{0}` is empty")]
    EmptyArgumentSpec(String),

    /// A default subscription was queried by a name that was never added.
    #[error("no such default subscription `{0}`")]
    NoSuchDefaultSubscription(String),

    /// The component has no cached subscription instance attached.
    #[error("component {0} has no cached subscriptions")]
    NotAttached(ComponentId),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
