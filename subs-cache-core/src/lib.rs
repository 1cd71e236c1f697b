//! Subs Cache Core
//!
//! Component-level subscription caching and readiness tracking on top of a
//! single-threaded reactive runtime.
//!
//! A component type declares named subscription *slots*. Each instance of
//! the type starts its slots when it is created (or rendered), restarts a
//! slot whenever the slot's reactive arguments change, and stops every
//! slot when it is destroyed. Subscriptions go through a shared external
//! [`SubscriptionCache`] that deduplicates identical `(name, args)` pairs
//! across the whole app. Readiness of every slot, of the component's own
//! subscriptions, of the process-wide default subscriptions and of
//! ancestor components is aggregated into reactive predicates.
//!
//! # Architecture
//!
//! - `reactive`: signals, tracked computations, flush and deferred tasks
//! - `component`: component types, instances and their hooks
//! - `slot`, `record`, `instance`: the per-instance lifecycle state machine
//! - `binder`: wiring slots into component hooks
//! - `readiness`, `defaults`: aggregation
//! - `manager`: process-level entry point
//!
//! # Example
//!
//! ```rust,ignore
//! use subs_cache_core::{ArgSpec, CacheManager, ComponentInstance, ComponentType, SlotOptions};
//!
//! let manager = CacheManager::new(|options| make_transport_cache(options));
//! let list = ComponentType::new("PostList");
//! manager.default_cache().prepare_cached_subscription(
//!     &[&list],
//!     "posts",
//!     ArgSpec::new("posts").getter(move |_| json!({ "page": page.get() })),
//!     SlotOptions::default(),
//! )?;
//!
//! let instance = ComponentInstance::create(&list, None)?;
//! Runtime::run_until_idle()?;
//! // `page.set(2)` restarts the subscription with the new page.
//! ```

pub mod binder;
pub mod component;
pub mod config;
pub mod defaults;
pub mod error;
pub mod instance;
mod latch;
pub mod manager;
pub mod params;
pub mod reactive;
pub mod readiness;
mod record;
pub mod slot;
pub mod subscription;

pub use binder::SlotCache;
pub use component::{ComponentId, ComponentInstance, ComponentType, Helpers, ReadinessMode};
pub use config::{CacheOptions, Diagnostics, LogRecord, LogSink};
pub use defaults::DefaultSubscriptions;
pub use error::{Error, Result};
pub use instance::CachedSubscriptionInstance;
pub use latch::StopSignal;
pub use manager::CacheManager;
pub use reactive::{untracked, Computation, Runtime, Signal};
pub use readiness::{all_ready, are_all_subs_ready, WhenAllSubsReady};
pub use slot::{Arg, ArgSpec, Args, SlotOptions};
pub use subscription::{SlotHandle, SubscriptionCache, SubscriptionHandle};
