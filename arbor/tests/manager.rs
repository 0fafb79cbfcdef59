//! Owner-scoped registration and firing through the event manager.

use arbor::{
    EventFilter, EventListener, EventManager, EventManagerConfig, EventNode, FailurePolicy,
    FireError, ListenerPriority, Owner,
    testing::{CallCounter, InvocationLog},
};
use std::time::Duration;

mod common;
use common::{PlayerEvent, PlayerJoin, ServerTick, join, recording};

fn manager() -> EventManager {
    EventManager::with_config(EventManagerConfig::new().with_pool_size(2)).unwrap()
}

#[tokio::test]
async fn test_bulk_unregister_leaves_other_owner() {
    let manager = manager();
    let x = Owner::new("x");
    let y = Owner::new("y");
    let x_calls = CallCounter::new();
    let y_calls = CallCounter::new();

    for _ in 0..5 {
        let calls = x_calls.clone();
        manager.register_handler(&x, move |_: &mut ServerTick| calls.hit());
    }
    let calls = y_calls.clone();
    manager.register_handler(&y, move |_: &mut ServerTick| calls.hit());

    assert_eq!(manager.unregister_listeners(&x), 5);
    assert!(manager.registrations(&x).is_empty());
    assert_eq!(manager.registrations(&y).len(), 1);

    let fired = manager.fire(ServerTick { tick: 1 }).await.unwrap();

    assert_eq!(fired.report().invoked(), 1);
    assert_eq!(x_calls.count(), 0);
    assert_eq!(y_calls.count(), 1);
}

#[tokio::test]
async fn test_priorities_through_manager() {
    let manager = manager();
    let owner = Owner::new("ordering");
    let log = InvocationLog::new();
    manager.register_with_priority(&owner, ListenerPriority::LOW, recording::<PlayerJoin>(&log, "low"));
    manager.register(&owner, recording::<PlayerJoin>(&log, "medium"));
    manager.register_handler_with_priority(&owner, ListenerPriority::HIGH, {
        let log = log.clone();
        move |_: &mut dyn PlayerEvent| log.record("high")
    });

    manager.fire(join("alex")).await.unwrap();

    assert_eq!(log.entries(), ["high", "medium", "low"]);
}

#[tokio::test]
async fn test_unobserved_event_resolves_without_dispatch() {
    let manager = manager();
    manager.register_handler(&Owner::new("joins"), |_: &mut PlayerJoin| ());

    assert!(!manager.has_listener_for::<ServerTick>());
    let fired = manager.fire(ServerTick { tick: 7 }).await.unwrap();

    assert_eq!(fired.into_event().tick, 7);
}

#[test]
fn test_fire_sync_runs_on_caller() {
    let manager = manager();
    let caller = std::thread::current().id();
    let seen = CallCounter::new();
    manager.register_handler(&Owner::new("sync"), {
        let seen = seen.clone();
        move |join: &mut PlayerJoin| {
            assert_eq!(std::thread::current().id(), caller);
            join.message = format!("hello {}", join.player);
            seen.hit();
        }
    });

    let mut event = join("alex");
    let report = manager.fire_sync(&mut event);

    assert_eq!(report.invoked(), 1);
    assert_eq!(event.message, "hello alex");
    assert_eq!(seen.count(), 1);
}

#[test]
fn test_fire_and_forget_delivers() {
    let manager = manager();
    let (tx, rx) = std::sync::mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    manager.register_handler(&Owner::new("sink"), move |tick: &mut ServerTick| {
        tx.lock().unwrap().send(tick.tick).unwrap();
    });

    manager.fire_and_forget(ServerTick { tick: 42 });

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
}

#[tokio::test]
async fn test_fail_future_policy_reports_all_failures() {
    let manager = EventManager::with_config(
        EventManagerConfig::new().with_failure_policy(FailurePolicy::FailFuture),
    )
    .unwrap();
    let owner = Owner::new("broken");
    let survivors = CallCounter::new();
    manager.register_handler(&owner, |_: &mut PlayerJoin| Err::<(), _>("first"));
    manager.register_handler(&owner, {
        let survivors = survivors.clone();
        move |_: &mut PlayerJoin| survivors.hit()
    });
    manager.register_handler(&owner, |_: &mut PlayerJoin| Err::<(), _>("second"));

    let err = manager.fire(join("alex")).await.unwrap_err();

    assert_eq!(survivors.count(), 1);
    match err {
        FireError::ListenersFailed { failures, .. } => assert_eq!(failures.len(), 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_custom_subtree_under_root() {
    let manager = manager();
    let vip = EventNode::filtered_for_value(
        "vip",
        EventFilter::<PlayerJoin, String>::create(|join| Some(join.player.clone())),
        |player| player.as_deref() == Some("alex"),
    );
    manager.root().add_child(&vip).unwrap();
    let log = InvocationLog::new();
    vip.register_listener(recording::<PlayerJoin>(&log, "vip")).unwrap();

    manager.fire(join("sam")).await.unwrap();
    manager.fire(join("alex")).await.unwrap();

    assert_eq!(log.entries(), ["vip"]);
    assert_eq!(manager.root().children()[0].name, "vip");
}

#[tokio::test]
async fn test_expiring_listener_via_manager() {
    let manager = manager();
    let owner = Owner::new("once");
    let calls = CallCounter::new();
    let listener = EventListener::<PlayerJoin>::builder()
        .expire_count(1)
        .handler({
            let calls = calls.clone();
            move |_: &mut PlayerJoin| calls.hit()
        })
        .build()
        .unwrap();
    manager.register(&owner, listener);

    manager.fire(join("a")).await.unwrap();
    manager.fire(join("b")).await.unwrap();

    assert_eq!(calls.count(), 1);
    assert!(!manager.has_listener_for::<PlayerJoin>());
}

#[cfg(feature = "timeout")]
#[tokio::test]
async fn test_fire_with_timeout_reports_stall() {
    use arbor::{EventTask, timeout::fire_with_timeout};

    let manager = manager();
    manager.register_handler(&Owner::new("stuck"), |_: &mut ServerTick| {
        EventTask::with_continuation(std::mem::forget)
    });

    let result = fire_with_timeout(&manager, ServerTick::default(), Duration::from_millis(50)).await;

    assert!(matches!(result, Err(FireError::TimedOut { .. })));
}
