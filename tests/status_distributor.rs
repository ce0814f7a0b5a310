mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use swap_exchange_core::status::distributor::{StatusDistributor, StatusError};
use swap_exchange_core::status::{SwapUpdate, SwapUpdateEvent, TransactionInfo};
use support::wait::wait_until;

fn seeded(swap_id: &str, status: SwapUpdateEvent) -> StatusDistributor {
    StatusDistributor::with_table(HashMap::from([(
        swap_id.to_string(),
        SwapUpdate::new(status),
    )]))
}

#[tokio::test]
async fn subscriber_sees_updates_in_order() -> Result<()> {
    let distributor = seeded("s", SwapUpdateEvent::SwapCreated);
    let mut sub = distributor.subscribe("s").context("subscribe")?;
    assert_eq!(sub.current().status, SwapUpdateEvent::SwapCreated);

    let u1 = SwapUpdate::new(SwapUpdateEvent::TransactionMempool);
    let u2 = SwapUpdate::new(SwapUpdateEvent::TransactionConfirmed).with_transaction(
        TransactionInfo {
            id: "aa".repeat(32),
            hex: None,
            eta: None,
        },
    );
    distributor.on_update("s", u1.clone());
    distributor.on_update("s", u2.clone());

    assert_eq!(sub.recv().await, Some(u1));
    assert_eq!(sub.recv().await, Some(u2.clone()));
    assert_eq!(distributor.get_status("s"), Some(u2));
    Ok(())
}

#[tokio::test]
async fn update_replaces_previous_payload() -> Result<()> {
    let distributor = StatusDistributor::new();
    distributor.on_update(
        "s",
        SwapUpdate::new(SwapUpdateEvent::InvoiceFailedToPay)
            .with_failure_reason(Some("no route".to_string())),
    );
    distributor.on_update("s", SwapUpdate::new(SwapUpdateEvent::SwapExpired));

    assert_eq!(
        distributor.get_status("s"),
        Some(SwapUpdate::new(SwapUpdateEvent::SwapExpired))
    );
    assert_eq!(distributor.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unsubscribed_sink_receives_nothing() -> Result<()> {
    let distributor = seeded("s", SwapUpdateEvent::InvoiceSet);
    let sub = distributor.subscribe("s")?;
    let handle = sub.handle();
    let (_, _, mut receiver) = sub.into_parts();

    assert!(distributor.unsubscribe("s", handle));
    assert!(!distributor.unsubscribe("s", handle), "second unsubscribe is a no-op");

    distributor.on_update("s", SwapUpdate::new(SwapUpdateEvent::InvoicePaid));
    assert_eq!(
        distributor.get_status("s").map(|u| u.status),
        Some(SwapUpdateEvent::InvoicePaid)
    );
    assert!(receiver.try_recv().is_err());
    assert_eq!(distributor.subscriber_count("s"), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_swap_is_not_found() -> Result<()> {
    let distributor = seeded("s", SwapUpdateEvent::SwapCreated);

    assert_eq!(distributor.get_status("missing"), None);
    assert_eq!(
        distributor.subscribe("missing").map(|_| ()),
        Err(StatusError::NotFound("missing".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn every_subscriber_receives_every_update() -> Result<()> {
    let distributor = seeded("s", SwapUpdateEvent::SwapCreated);
    let mut first = distributor.subscribe("s")?;
    let mut second = distributor.subscribe("s")?;
    assert_ne!(first.handle(), second.handle());
    assert_eq!(distributor.subscriber_count("s"), 2);

    let update = SwapUpdate::new(SwapUpdateEvent::TransactionClaimed);
    distributor.on_update("s", update.clone());

    assert_eq!(first.recv().await, Some(update.clone()));
    assert_eq!(second.recv().await, Some(update));
    Ok(())
}

#[tokio::test]
async fn dropped_subscriber_is_pruned_without_affecting_others() -> Result<()> {
    let distributor = seeded("s", SwapUpdateEvent::SwapCreated);
    let gone = distributor.subscribe("s")?;
    let mut alive = distributor.subscribe("s")?;
    drop(gone);

    let update = SwapUpdate::new(SwapUpdateEvent::InvoicePending);
    distributor.on_update("s", update.clone());

    assert_eq!(alive.recv().await, Some(update));
    assert_eq!(distributor.subscriber_count("s"), 1);
    Ok(())
}

#[tokio::test]
async fn updates_for_other_swaps_are_not_delivered() -> Result<()> {
    let distributor = StatusDistributor::with_table(HashMap::from([
        ("a".to_string(), SwapUpdate::new(SwapUpdateEvent::SwapCreated)),
        ("b".to_string(), SwapUpdate::new(SwapUpdateEvent::SwapCreated)),
    ]));
    let sub = distributor.subscribe("a")?;
    let (_, _, mut receiver) = sub.into_parts();

    distributor.on_update("b", SwapUpdate::new(SwapUpdateEvent::SwapExpired));
    assert!(receiver.try_recv().is_err());
    assert_eq!(
        distributor.get_status("a").map(|u| u.status),
        Some(SwapUpdateEvent::SwapCreated)
    );
    Ok(())
}

#[tokio::test]
async fn event_bus_applies_published_updates_in_order() -> Result<()> {
    let distributor = Arc::new(seeded("s", SwapUpdateEvent::SwapCreated));
    let mut sub = distributor.subscribe("s")?;
    let (publisher, task) = distributor.spawn_event_bus();

    let statuses = [
        SwapUpdateEvent::InvoiceSet,
        SwapUpdateEvent::TransactionMempool,
        SwapUpdateEvent::TransactionConfirmed,
        SwapUpdateEvent::InvoicePaid,
    ];
    for status in statuses {
        publisher.publish("s", SwapUpdate::new(status))?;
    }
    publisher.publish("fresh", SwapUpdate::new(SwapUpdateEvent::SwapCreated))?;

    for status in statuses {
        assert_eq!(sub.recv().await.map(|u| u.status), Some(status));
    }
    wait_until("fresh swap status", Duration::from_secs(5), || {
        distributor.get_status("fresh")
    })
    .await?;

    drop(publisher);
    task.await.context("join event bus")?;
    Ok(())
}

#[tokio::test]
async fn concurrent_updates_keep_per_swap_order() -> Result<()> {
    let distributor = Arc::new(StatusDistributor::new());
    let swap_ids: Vec<String> = (0..32).map(|i| format!("swap-{i}")).collect();
    for id in &swap_ids {
        distributor.on_update(id, SwapUpdate::new(SwapUpdateEvent::SwapCreated));
    }

    let mut subs = Vec::new();
    for id in &swap_ids {
        subs.push(distributor.subscribe(id)?);
    }

    let producers: Vec<_> = swap_ids
        .iter()
        .cloned()
        .map(|id| {
            let distributor = distributor.clone();
            tokio::spawn(async move {
                for status in [
                    SwapUpdateEvent::InvoiceSet,
                    SwapUpdateEvent::InvoicePaid,
                    SwapUpdateEvent::InvoiceSettled,
                ] {
                    distributor.on_update(&id, SwapUpdate::new(status));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.context("join producer")?;
    }

    for sub in &mut subs {
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(sub.recv().await.context("subscription closed")?.status);
        }
        assert_eq!(
            seen,
            vec![
                SwapUpdateEvent::InvoiceSet,
                SwapUpdateEvent::InvoicePaid,
                SwapUpdateEvent::InvoiceSettled,
            ],
            "{}",
            sub.swap_id()
        );
    }
    assert_eq!(distributor.len(), swap_ids.len());
    Ok(())
}

#[tokio::test]
async fn lagging_subscriber_is_dropped_when_its_buffer_fills() -> Result<()> {
    let distributor = StatusDistributor::new().with_sink_capacity(2);
    distributor.on_update("s", SwapUpdate::new(SwapUpdateEvent::SwapCreated));
    let mut sub = distributor.subscribe("s")?;

    let statuses = [
        SwapUpdateEvent::InvoiceSet,
        SwapUpdateEvent::InvoicePaid,
        SwapUpdateEvent::InvoiceSettled,
    ];
    for status in statuses {
        distributor.on_update("s", SwapUpdate::new(status));
    }

    assert_eq!(distributor.subscriber_count("s"), 0);
    assert_eq!(sub.recv().await.map(|u| u.status), Some(statuses[0]));
    assert_eq!(sub.recv().await.map(|u| u.status), Some(statuses[1]));
    assert_eq!(sub.recv().await, None);
    assert_eq!(
        distributor.get_status("s").map(|u| u.status),
        Some(SwapUpdateEvent::InvoiceSettled)
    );
    Ok(())
}
