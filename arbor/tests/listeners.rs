//! Listener lifecycle: expiry, filters and denied results.

use arbor::{
    EventListener, EventManager, EventNode, EventResult, FailureCause, ListenerResult, Owner,
    ReasonedResult, Resulted,
    testing::{CallCounter, InvocationLog},
};

mod common;
use common::{PlayerChat, PlayerJoin, chat, join};

#[test]
fn test_expire_count_one_expires_on_second_run() {
    let counter = CallCounter::new();
    let listener = EventListener::<PlayerJoin>::builder()
        .expire_count(1)
        .handler({
            let counter = counter.clone();
            move |_: &mut PlayerJoin| counter.hit()
        })
        .build()
        .unwrap();

    assert_eq!(listener.run(&mut join("a")).result(), ListenerResult::Success);
    assert!(listener.is_expired());
    assert_eq!(listener.run(&mut join("b")).result(), ListenerResult::Expired);
    assert_eq!(listener.run(&mut join("c")).result(), ListenerResult::Expired);
    assert_eq!(counter.count(), 1);
}

#[test]
fn test_expire_when_stops_after_condition_holds() {
    let log = InvocationLog::new();
    let listener = EventListener::<PlayerJoin>::builder()
        .expire_when(|join| join.player == "last")
        .handler({
            let log = log.clone();
            move |join: &mut PlayerJoin| log.record(join.player.clone())
        })
        .build()
        .unwrap();

    let node = EventNode::all("root");
    node.register_listener(listener.clone()).unwrap();
    for player in ["first", "last", "after"] {
        node.fire(&mut join(player));
    }

    assert_eq!(log.entries(), ["first", "last"]);
    assert!(listener.is_expired());
    assert_eq!(listener.invocations(), 2);
    assert_eq!(node.listener_count(), 0);
}

#[test]
fn test_filters_are_conjunctive() {
    let log = InvocationLog::new();
    let listener = EventListener::<PlayerChat>::builder()
        .add_filter(|chat| chat.player.starts_with('a'))
        .add_filter(|chat| chat.message.len() > 3)
        .handler({
            let log = log.clone();
            move |chat: &mut PlayerChat| log.record(chat.message.clone())
        })
        .build()
        .unwrap();

    assert_eq!(listener.run(&mut chat("bob", "hello")).result(), ListenerResult::Invalid);
    assert_eq!(listener.run(&mut chat("alex", "hi")).result(), ListenerResult::Invalid);
    assert_eq!(listener.run(&mut chat("alex", "hello")).result(), ListenerResult::Success);
    assert_eq!(log.entries(), ["hello"]);
    assert_eq!(listener.invocations(), 1);
}

#[test]
fn test_denied_event_skipping() {
    let strict_calls = CallCounter::new();
    let lenient_calls = CallCounter::new();
    let strict = EventListener::<PlayerChat>::of({
        let calls = strict_calls.clone();
        move |_: &mut PlayerChat| calls.hit()
    });
    let lenient = EventListener::<PlayerChat>::builder()
        .ignore_denied(true)
        .handler({
            let calls = lenient_calls.clone();
            move |chat: &mut PlayerChat| {
                calls.hit();
                chat.set_result(ReasonedResult::Allowed);
            }
        })
        .build()
        .unwrap();

    let mut event = chat("alex", "buy gold");
    event.set_result(ReasonedResult::denied("spam"));

    assert_eq!(strict.run(&mut event).result(), ListenerResult::Invalid);
    assert_eq!(strict_calls.count(), 0);
    assert_eq!(lenient.run(&mut event).result(), ListenerResult::Success);
    assert_eq!(lenient_calls.count(), 1);
    assert!(event.result().is_allowed());

    // Allowed again, so the strict listener processes it.
    assert_eq!(strict.run(&mut event).result(), ListenerResult::Success);
    assert_eq!(strict_calls.count(), 1);
}

#[test]
fn test_denial_reason_survives_dispatch() {
    let node = EventNode::all("root");
    node.register_handler(|chat: &mut PlayerChat| {
        if chat.message.contains("gold") {
            chat.set_result(ReasonedResult::denied("no advertising"));
        }
    })
    .unwrap();

    let mut event = chat("alex", "buy gold");
    node.fire(&mut event);

    assert!(!event.result().is_allowed());
    assert_eq!(event.result().reason(), Some("no advertising"));
}

#[test]
fn test_handler_panic_is_contained() {
    let node = EventNode::all("root");
    let counter = CallCounter::new();
    node.register_handler(|join: &mut PlayerJoin| {
        if join.player.is_empty() {
            panic!("player without a name");
        }
    })
    .unwrap();
    node.register_handler({
        let counter = counter.clone();
        move |_: &mut PlayerJoin| counter.hit()
    })
    .unwrap();

    let report = node.fire(&mut join(""));

    assert_eq!(counter.count(), 1);
    assert_eq!(report.failures().len(), 1);
    assert!(report.failures()[0].to_string().contains("player without a name"));
}

fn reject_loudly(_: &PlayerJoin) -> bool {
    panic!("filter exploded");
}

#[tokio::test]
async fn test_filter_panic_stays_inside_listener() {
    let manager = EventManager::new().unwrap();
    let owner = Owner::new("filters");
    let calls = CallCounter::new();
    manager.register(
        &owner,
        EventListener::<PlayerJoin>::builder()
            .add_filter(reject_loudly)
            .handler(|_: &mut PlayerJoin| ())
            .build()
            .unwrap(),
    );
    manager.register_handler(&owner, {
        let calls = calls.clone();
        move |_: &mut PlayerJoin| calls.hit()
    });

    let fired = manager.fire(join("alex")).await.unwrap();

    assert_eq!(calls.count(), 1);
    assert_eq!(fired.failures().len(), 1);
    assert!(matches!(fired.failures()[0].cause, FailureCause::Exception(_)));
    assert!(fired.failures()[0].to_string().contains("filter exploded"));
}
