//! Broadcast bus behaviour seen from outside the crate

mod common;

use common::WAIT;
use futures::StreamExt;
use proptest::prelude::*;
use tokio_test::assert_ok;
use transmission::{channel, Broadcast, TransmissionError};

#[tokio::test]
async fn test_every_subscriber_sees_every_item_in_order() {
    let bus: Broadcast<u32> = Broadcast::new("fan-out", 64);
    let mut first = bus.subscribe();
    let mut second = bus.subscribe();

    for n in 0..10 {
        assert_eq!(assert_ok!(bus.send(n)), 2);
    }
    for n in 0..10 {
        assert_eq!(first.recv().await, Some(n));
        assert_eq!(second.recv().await, Some(n));
    }
    assert_eq!(bus.stats().sent, 10);
}

#[tokio::test]
async fn test_late_subscriber_starts_at_subscription() {
    let (producer, output) = channel::<&'static str>("late", 8);
    let mut early = output.subscribe();
    assert_ok!(producer.send("before"));

    let mut late = output.subscribe();
    assert_eq!(late.baseline(), 1);
    assert_ok!(producer.send("after"));

    assert_eq!(early.recv().await, Some("before"));
    assert_eq!(early.recv().await, Some("after"));
    assert_eq!(late.recv().await, Some("after"));
    assert_eq!(late.try_recv(), None);
}

#[tokio::test]
async fn test_slow_subscriber_loses_oldest_items() {
    let bus: Broadcast<u32> = Broadcast::new("ring", 4);
    let mut slow = bus.subscribe();

    for n in 0..10 {
        assert_ok!(bus.send(n));
    }
    let received: Vec<u32> = std::iter::from_fn(|| slow.try_recv()).collect();
    assert_eq!(received, vec![6, 7, 8, 9]);
    assert_eq!(bus.stats().lagged, 6);
}

#[tokio::test]
async fn test_closed_bus_drains_then_ends() {
    let bus: Broadcast<u32> = Broadcast::new("closing", 8);
    let producer = bus.producer();
    let stream = bus.subscribe().into_stream();
    assert_ok!(producer.send(1));
    assert_ok!(producer.send(2));

    bus.close();
    bus.close();

    assert!(bus.is_closed());
    assert_eq!(producer.send(3), Err(TransmissionError::BusClosed("closing")));
    let drained: Vec<u32> = tokio::time::timeout(WAIT, stream.collect()).await.unwrap();
    assert_eq!(drained, vec![1, 2]);

    let mut after_close = bus.subscribe();
    assert_eq!(after_close.recv().await, None);
}

proptest! {
    #[test]
    fn prop_subscribers_agree_on_order(items in prop::collection::vec(any::<u16>(), 0..64)) {
        let bus: Broadcast<u16> = Broadcast::new("prop", 64);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        for item in &items {
            bus.send(*item).unwrap();
        }
        let seen_first: Vec<u16> = std::iter::from_fn(|| first.try_recv()).collect();
        let seen_second: Vec<u16> = std::iter::from_fn(|| second.try_recv()).collect();
        prop_assert_eq!(&seen_first, &items);
        prop_assert_eq!(seen_first, seen_second);
    }
}
