// Copyright 2024 Lostfound Team.
//
// Tests for ChangeBus subscriptions

use lostfound_chat::{ChangeBus, ChangeEvent, EventKinds, SubscriptionHandle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn deleted(id: &str) -> ChangeEvent {
    ChangeEvent::MessageDeleted {
        conversation_id: "c1".to_string(),
        message_id: id.to_string(),
    }
}

fn read(count: u64) -> ChangeEvent {
    ChangeEvent::MessagesRead {
        conversation_id: "c1".to_string(),
        reader_id: "bob".to_string(),
        count,
    }
}

async fn wait_for(counter: &AtomicUsize, n: usize) {
    for _ in 0..200 {
        if counter.load(Ordering::SeqCst) >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("callback ran {} times, expected {}", counter.load(Ordering::SeqCst), n);
}

#[tokio::test]
async fn test_recv_filters_kinds() {
    let bus = ChangeBus::new(16);
    let mut sub = bus.subscribe("c1", EventKinds::DELETED);

    bus.publish("c1", read(1));
    bus.publish("c1", deleted("m1"));
    bus.publish("c2", deleted("other"));

    assert_eq!(sub.recv().await, Some(deleted("m1")));
}

#[tokio::test]
async fn test_topics_are_isolated() {
    let bus = ChangeBus::new(16);
    let mut c1 = bus.subscribe("c1", EventKinds::ALL);
    let mut c2 = bus.subscribe("c2", EventKinds::ALL);

    assert_eq!(bus.publish("c1", deleted("m1")), 1);

    assert_eq!(c1.recv().await, Some(deleted("m1")));
    let pending = tokio::time::timeout(Duration::from_millis(20), c2.recv()).await;
    assert!(pending.is_err());
}

#[tokio::test]
async fn test_events_arrive_in_publish_order() {
    let bus = ChangeBus::new(64);
    let mut sub = bus.subscribe("c1", EventKinds::ALL);

    for i in 0..20 {
        bus.publish("c1", deleted(&format!("m{}", i)));
    }
    for i in 0..20 {
        assert_eq!(sub.recv().await, Some(deleted(&format!("m{}", i))));
    }
}

#[tokio::test]
async fn test_slow_subscriber_gets_lagged() {
    let bus = ChangeBus::new(2);
    let mut sub = bus.subscribe("c1", EventKinds::ALL);

    for i in 0..5 {
        bus.publish("c1", deleted(&format!("m{}", i)));
    }

    assert_eq!(sub.recv().await, Some(ChangeEvent::Lagged { missed: 3 }));
    assert_eq!(sub.recv().await, Some(deleted("m3")));
    assert_eq!(sub.recv().await, Some(deleted("m4")));
}

#[tokio::test]
async fn test_unsubscribe_wakes_pending_recv() {
    let bus = ChangeBus::new(16);
    let mut sub = bus.subscribe("c1", EventKinds::ALL);
    let handle = sub.handle();

    let waiter = tokio::spawn(async move { sub.recv().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    handle.unsubscribe();
    handle.unsubscribe();
    assert!(handle.is_closed());

    assert_eq!(waiter.await.unwrap(), None);
}

#[tokio::test]
async fn test_no_callback_after_unsubscribe() {
    let bus = ChangeBus::new(16);
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let handle = bus.subscribe_with("c1", EventKinds::ALL, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish("c1", deleted("m1"));
    wait_for(&calls, 1).await;

    handle.unsubscribe();
    handle.unsubscribe();

    for i in 0..5 {
        bus.publish("c1", deleted(&format!("late{}", i)));
    }
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unsubscribe_from_inside_callback() {
    let bus = ChangeBus::new(16);
    let calls = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

    let counter = calls.clone();
    let own_handle = slot.clone();
    let handle = bus.subscribe_with("c1", EventKinds::ALL, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = own_handle.lock().unwrap().as_ref() {
            handle.unsubscribe();
        }
    });
    *slot.lock().unwrap() = Some(handle.clone());

    bus.publish("c1", deleted("m1"));
    wait_for(&calls, 1).await;
    assert!(handle.is_closed());

    bus.publish("c1", deleted("m2"));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
