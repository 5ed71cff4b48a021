//! Integration tests for the event bus
//!
//! Exercises fan-out across tasks and subscriber lifetimes

#![cfg(feature = "runtime")]

use std::time::Duration;

use unimoghub_common::events::EventBus;

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkEvent {
    Up { attempt: u32 },
    Down,
}

/// Validates that every subscriber task observes every event in order.
///
/// # Test Steps
/// 1. Spawn two subscriber tasks
/// 2. Publish three events from the test task
/// 3. Drop the bus so subscribers see the end of stream
/// 4. Verify both tasks collected the same ordered sequence
#[tokio::test]
async fn test_fan_out_across_tasks() {
    let bus = EventBus::new(8);
    let mut handles = Vec::new();
    for _ in 0..2 {
        let mut subscription = bus.subscribe();
        handles.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(event) = subscription.recv().await {
                seen.push(event);
            }
            seen
        }));
    }

    assert_eq!(bus.publish(LinkEvent::Up { attempt: 1 }), 2);
    bus.publish(LinkEvent::Down);
    bus.publish(LinkEvent::Up { attempt: 2 });
    drop(bus);

    for handle in handles {
        let seen = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("subscriber finishes")
            .expect("task joins");
        assert_eq!(
            seen,
            vec![LinkEvent::Up { attempt: 1 }, LinkEvent::Down, LinkEvent::Up { attempt: 2 }]
        );
    }
}

/// Validates that a dropped subscription stops counting as a listener.
#[tokio::test]
async fn test_dropped_subscription_unregisters() {
    let bus = EventBus::<LinkEvent>::default();
    let filtered = bus.subscribe_filtered(|event| matches!(event, LinkEvent::Down));
    assert_eq!(bus.subscriber_count(), 1);

    drop(filtered);
    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(bus.publish(LinkEvent::Down), 0);
    assert_eq!(bus.published_count(), 1);
}
