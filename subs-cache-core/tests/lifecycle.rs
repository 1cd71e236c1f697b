//! Integration Tests for the Slot Lifecycle
//!
//! Start, argument-driven restart, stop and forced restart of slots on a
//! cached-subscription instance, checked against the calls the fake
//! transport sees and the order hooks fire in.

mod support;

use std::cell::Cell;
use std::rc::Rc;

use serde_json::json;
use subs_cache_core::reactive::{Runtime, Signal};
use subs_cache_core::{ArgSpec, ComponentInstance, ComponentType, Error, SlotOptions};

use support::{stop, subscribe, FakeCache, HookLog};

fn component(name: &str) -> ComponentInstance {
    ComponentInstance::create(&ComponentType::new(name), None).unwrap()
}

/// Test that a second start without a stop in between is rejected.
#[test]
fn second_start_is_a_duplicate() {
    let fake = FakeCache::new();
    let manager = support::manager(&fake);
    let instance = component("Feed");
    let cached = manager.default_cache().instance_for(&instance);
    cached
        .register_slot("feed", ArgSpec::new("feed"), SlotOptions::default())
        .unwrap();

    cached.start_sub("feed").unwrap();
    assert_eq!(cached.start_sub("feed"), Err(Error::DuplicateStart("feed".into())));
    Runtime::run_until_idle().unwrap();
    assert_eq!(fake.subscribe_count(), 1);

    // Still a duplicate once the subscription is live
    assert_eq!(cached.start_sub("feed"), Err(Error::DuplicateStart("feed".into())));

    // A full stop re-opens the slot
    cached.stop_sub("feed").unwrap();
    Runtime::run_until_idle().unwrap();
    cached.start_sub("feed").unwrap();
    Runtime::run_until_idle().unwrap();
    assert_eq!(fake.subscribe_count(), 2);
}

/// Test that a re-run with equal arguments does nothing.
#[test]
fn equal_arguments_do_not_restart() {
    let fake = FakeCache::new();
    let manager = support::manager(&fake);
    let hooks = HookLog::new();
    let page = Signal::new(1);
    let evaluations = Rc::new(Cell::new(0));

    let instance = component("Posts");
    let cached = manager.default_cache().instance_for(&instance);
    let p = page.clone();
    let e = evaluations.clone();
    cached
        .register_slot(
            "posts",
            ArgSpec::new("posts").getter(move |_| {
                e.set(e.get() + 1);
                json!({ "bucket": p.get() / 10 })
            }),
            hooks.attach(SlotOptions::default()),
        )
        .unwrap();
    cached.start_sub("posts").unwrap();
    Runtime::run_until_idle().unwrap();
    hooks.clear();

    // The getter re-runs but resolves to the same arguments
    page.set(2);
    Runtime::run_until_idle().unwrap();

    assert_eq!(evaluations.get(), 2);
    assert!(hooks.calls().is_empty());
    assert_eq!(fake.events(), vec![subscribe("posts", vec![json!({ "bucket": 0 })], Some(5.0))]);
}

/// Test that changing the argument source stops the old subscription
/// before starting the new one.
#[test]
fn argument_change_restarts_in_order() {
    let fake = FakeCache::new();
    let manager = support::manager(&fake);
    let hooks = HookLog::new();
    let source = Signal::new(String::from("A"));

    let instance = component("Thread");
    let cached = manager.default_cache().instance_for(&instance);
    let s = source.clone();
    cached
        .register_slot(
            "thread",
            ArgSpec::new("thread").getter(move |_| json!(s.get())),
            hooks.attach(SlotOptions::default()),
        )
        .unwrap();
    cached.start_sub("thread").unwrap();
    Runtime::run_until_idle().unwrap();
    assert_eq!(hooks.calls(), vec!["before_start:A", "after_start:A"]);
    hooks.clear();

    source.set("B".to_string());
    Runtime::run_until_idle().unwrap();

    assert_eq!(
        hooks.calls(),
        vec!["before_stop:A", "after_stop:A", "before_start:B", "after_start:B"]
    );
    assert_eq!(
        fake.events(),
        vec![
            subscribe("thread", vec![json!("A")], Some(5.0)),
            stop("thread", vec![json!("A")]),
            subscribe("thread", vec![json!("B")], Some(5.0)),
        ]
    );
    assert!(cached.is_started("thread"));
    assert_eq!(
        cached.subscription_args("thread"),
        Some(vec![json!("thread"), json!("B")])
    );

    // The restart kept the slot started
    assert_eq!(cached.start_sub("thread"), Err(Error::DuplicateStart("thread".into())));
}

/// Test that a change racing the first subscribe queues behind it.
#[test]
fn argument_change_before_first_subscribe_lands() {
    let fake = FakeCache::new();
    let manager = support::manager(&fake);
    let hooks = HookLog::new();
    let source = Signal::new(String::from("A"));

    let instance = component("Thread");
    let cached = manager.default_cache().instance_for(&instance);
    let s = source.clone();
    cached
        .register_slot(
            "thread",
            ArgSpec::new("thread").getter(move |_| json!(s.get())),
            hooks.attach(SlotOptions::default()),
        )
        .unwrap();
    cached.start_sub("thread").unwrap();

    // Nothing has been subscribed yet
    source.set("B".to_string());
    Runtime::flush().unwrap();
    assert!(fake.events().is_empty());

    Runtime::run_until_idle().unwrap();
    assert_eq!(
        hooks.calls(),
        vec![
            "before_start:A",
            "after_start:A",
            "before_stop:A",
            "after_stop:A",
            "before_start:B",
            "after_start:B",
        ]
    );
    assert_eq!(
        fake.events(),
        vec![
            subscribe("thread", vec![json!("A")], Some(5.0)),
            stop("thread", vec![json!("A")]),
            subscribe("thread", vec![json!("B")], Some(5.0)),
        ]
    );
}

/// Test that a stop issued right after a start waits for the subscribe.
#[test]
fn stop_waits_for_subscribe() {
    let fake = FakeCache::new();
    let manager = support::manager(&fake);
    let instance = component("Quick");
    let cached = manager.default_cache().instance_for(&instance);
    cached
        .register_slot("quick", ArgSpec::new("quick").arg(1), SlotOptions::default())
        .unwrap();

    cached.start_sub("quick").unwrap();
    let mut signal = cached.stop_sub("quick").unwrap();
    assert!(fake.events().is_empty());
    assert!(!signal.is_complete());

    // The slot is already on its way down
    assert!(matches!(
        cached.stop_sub("quick"),
        Err(Error::NoActiveSubscription(_))
    ));

    Runtime::run_until_idle().unwrap();
    assert!(signal.is_complete());
    assert_eq!(
        fake.events(),
        vec![
            subscribe("quick", vec![json!(1)], Some(5.0)),
            stop("quick", vec![json!(1)]),
        ]
    );
    assert!(!cached.is_started("quick"));
    assert!(cached.get_handle("quick").is_none());
}

/// Test that the stop signal can be awaited.
#[tokio::test]
async fn stop_signal_is_awaitable() {
    let fake = FakeCache::new();
    let manager = support::manager(&fake);
    let instance = component("Awaited");
    let cached = manager.default_cache().instance_for(&instance);
    cached
        .register_slot("a", ArgSpec::new("a"), SlotOptions::default())
        .unwrap();
    cached.start_sub("a").unwrap();
    Runtime::run_until_idle().unwrap();

    let signal = cached.stop_sub("a").unwrap();
    Runtime::run_until_idle().unwrap();
    signal.await.unwrap();
    assert_eq!(fake.stop_count(), 1);
}

/// Test that a stop which keeps the driving computation leaves the slot
/// started.
#[test]
fn stop_without_driving_keeps_slot_started() {
    let fake = FakeCache::new();
    let manager = support::manager(&fake);
    let instance = component("Partial");
    let cached = manager.default_cache().instance_for(&instance);
    cached
        .register_slot("p", ArgSpec::new("p"), SlotOptions::default())
        .unwrap();
    cached.start_sub("p").unwrap();
    Runtime::run_until_idle().unwrap();

    let mut signal = cached.stop_sub_with("p", false).unwrap();
    assert!(signal.is_complete());
    assert_eq!(fake.stop_count(), 1);
    assert!(cached.is_started("p"));
    assert!(!cached.slot_ready("p"));
}

/// Test that a forced restart stops and then subscribes again.
#[test]
fn restart_resubscribes() {
    let fake = FakeCache::new();
    let manager = support::manager(&fake);
    let hooks = HookLog::new();
    let instance = component("Forced");
    let cached = manager.default_cache().instance_for(&instance);
    cached
        .register_slot("f", ArgSpec::new("f").arg("x"), hooks.attach(SlotOptions::default()))
        .unwrap();
    cached.start_sub("f").unwrap();
    Runtime::run_until_idle().unwrap();
    hooks.clear();

    cached.restart_sub("f").unwrap();
    Runtime::run_until_idle().unwrap();

    assert_eq!(
        hooks.calls(),
        vec!["before_stop:x", "after_stop:x", "before_start:x", "after_start:x"]
    );
    assert_eq!(
        fake.events(),
        vec![
            subscribe("f", vec![json!("x")], Some(5.0)),
            stop("f", vec![json!("x")]),
            subscribe("f", vec![json!("x")], Some(5.0)),
        ]
    );
    assert!(cached.is_started("f"));
}

/// Test that restarting or stopping a slot with nothing active fails.
#[test]
fn misuse_is_loud() {
    let fake = FakeCache::new();
    let manager = support::manager(&fake);
    let instance = component("Misuse");
    let cached = manager.default_cache().instance_for(&instance);
    cached
        .register_slot("m", ArgSpec::new("m"), SlotOptions::default())
        .unwrap();

    assert_eq!(
        cached.restart_sub("m").err(),
        Some(Error::NoActiveSubscription("m".into()))
    );
    assert_eq!(cached.stop_sub("m").err(), Some(Error::NoActiveSubscription("m".into())));
    assert_eq!(cached.stop_sub("zz").err(), Some(Error::UnknownSlot("zz".into())));
    assert_eq!(
        cached.register_slot("m", ArgSpec::new("m"), SlotOptions::default()),
        Ok(false)
    );
}

/// Test the TTL chosen for each subscribe call.
#[test]
fn ttl_comes_from_slot_then_cache() {
    let fake = FakeCache::new();
    let manager = support::manager(&fake);
    let no_ttl = manager.make_cache(subs_cache_core::CacheOptions {
        expire_after: None,
        cache_limit: None,
    });

    let instance = component("Ttl");
    let cached = manager.default_cache().instance_for(&instance);
    cached
        .register_slot("default", ArgSpec::new("default"), SlotOptions::default())
        .unwrap();
    cached
        .register_slot("short", ArgSpec::new("short"), SlotOptions::new().expire_after(0.5))
        .unwrap();
    cached.start_sub("default").unwrap();
    cached.start_sub("short").unwrap();

    let other = component("NoTtl");
    let plain = no_ttl.instance_for(&other);
    plain
        .register_slot("plain", ArgSpec::new("plain"), SlotOptions::default())
        .unwrap();
    plain.start_sub("plain").unwrap();
    Runtime::run_until_idle().unwrap();

    assert_eq!(
        fake.events(),
        vec![
            subscribe("default", vec![], Some(5.0)),
            subscribe("short", vec![], Some(0.5)),
            subscribe("plain", vec![], None),
        ]
    );
}

/// Test that stopped subscriptions release their handles.
#[test]
fn stopped_handles_are_released() {
    let fake = FakeCache::new();
    let manager = support::manager(&fake);
    let page = Signal::new(0);
    let kind = ComponentType::new("Pager");
    let p = page.clone();
    manager
        .default_cache()
        .prepare_cached_subscription(
            &[&kind],
            "pages",
            ArgSpec::new("pages").getter(move |_| json!(p.get())),
            SlotOptions::default(),
        )
        .unwrap();

    let instance = ComponentInstance::create(&kind, None).unwrap();
    Runtime::run_until_idle().unwrap();
    fake.resolve("pages");
    for n in 1..=5 {
        page.set(n);
        Runtime::run_until_idle().unwrap();
    }
    assert_eq!(fake.subscribe_count(), 6);
    assert_eq!(fake.live_handles(), 1);

    instance.destroy().unwrap();
    Runtime::run_until_idle().unwrap();
    assert_eq!(fake.stop_count(), 6);
    assert_eq!(fake.live_handles(), 0);
}
