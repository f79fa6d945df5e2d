//! Status monitoring across a whole escrow lifetime.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::harness::{job_output, Scenario};
use futures::StreamExt;
use masumi_client::{MonitorEvent, PaymentStatus, PurchaseStatus, ServiceError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_secs(10);

#[tokio::test(start_paused = true)]
async fn test_seller_monitor_sees_every_step_once() {
    let mut s = Scenario::new().await.expect("scenario");
    let mut monitor = s
        .payment
        .start_status_monitoring(INTERVAL)
        .expect("monitor");
    let mut seen = Vec::new();

    while let Some(event) = monitor.next_event().await {
        let MonitorEvent::StatusChanged(status) = event else {
            panic!("unexpected poll error");
        };
        seen.push(status);
        match status {
            PaymentStatus::Created => {
                s.purchase.create_purchase_request().await.expect("purchase");
                s.ledger.settle(&s.id);
            }
            PaymentStatus::PaymentConfirmed => {
                s.payment
                    .complete_with_output(&s.id, &job_output())
                    .await
                    .expect("complete");
                s.ledger.settle(&s.id);
            }
            PaymentStatus::ResultSubmitted => s.ledger.withdraw(&s.id),
            _ => {}
        }
    }

    assert_eq!(
        seen,
        [
            PaymentStatus::Created,
            PaymentStatus::PaymentConfirmed,
            PaymentStatus::ResultSubmitted,
            PaymentStatus::Unlocked
        ]
    );
    assert_eq!(s.payment.status(), Some(PaymentStatus::Unlocked));
}

#[tokio::test(start_paused = true)]
async fn test_buyer_observer_follows_ledger() {
    let mut s = Scenario::new().await.expect("scenario");
    s.purchase.create_purchase_request().await.expect("purchase");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handle = s
        .purchase
        .start_status_monitoring(INTERVAL)
        .expect("monitor")
        .observe(move |event| {
            if let Some(status) = event.status() {
                sink.lock().push(*status);
            }
        });

    // Polls happen at t = 0, 10, 20, ...; the ledger moves halfway between.
    tokio::time::sleep(INTERVAL / 2).await;
    s.ledger.begin_funds_lock(&s.id);
    tokio::time::sleep(INTERVAL).await;
    s.ledger.settle(&s.id);
    tokio::time::sleep(INTERVAL).await;
    s.payment.check_payment_status().await.expect("check");
    s.payment
        .complete_with_output(&s.id, &job_output())
        .await
        .expect("complete");
    s.ledger.settle(&s.id);
    tokio::time::sleep(INTERVAL).await;
    s.ledger.withdraw(&s.id);

    handle.join().await;
    assert_eq!(
        *seen.lock(),
        [
            PurchaseStatus::Created,
            PurchaseStatus::Paid,
            PurchaseStatus::AwaitingResult,
            PurchaseStatus::ResultReceived,
            PurchaseStatus::Unlocked
        ]
    );
    assert_eq!(s.purchase.status(), Some(PurchaseStatus::Unlocked));
}

#[tokio::test(start_paused = true)]
async fn test_buyer_monitor_follows_dispute_to_refund() {
    let mut s = Scenario::new().await.expect("scenario");
    s.lock_funds().await.expect("lock funds");
    s.payment
        .complete_with_output(&s.id, &job_output())
        .await
        .expect("complete");
    s.ledger.settle(&s.id);
    s.purchase.check_purchase_status().await.expect("check");
    s.purchase.request_refund().await.expect("request refund");
    s.ledger.settle(&s.id);

    let mut monitor = s
        .purchase
        .start_status_monitoring(INTERVAL)
        .expect("monitor");
    assert!(matches!(
        monitor.next_event().await,
        Some(MonitorEvent::StatusChanged(PurchaseStatus::RefundRequested))
    ));

    assert_eq!(
        s.payment.check_payment_status().await.expect("check"),
        PaymentStatus::Disputed
    );
    s.payment.authorize_refund(&s.id).await.expect("authorize");
    assert!(matches!(
        monitor.next_event().await,
        Some(MonitorEvent::StatusChanged(PurchaseStatus::RefundAuthorized))
    ));

    s.ledger.settle(&s.id);
    assert!(matches!(
        monitor.next_event().await,
        Some(MonitorEvent::StatusChanged(PurchaseStatus::Refunded))
    ));
    assert!(monitor.next_event().await.is_none());
    assert_eq!(s.purchase.status(), Some(PurchaseStatus::Refunded));
}

#[tokio::test(start_paused = true)]
async fn test_poll_errors_do_not_stop_monitoring() {
    let s = Scenario::new().await.expect("scenario");
    s.ledger.fail_next(ServiceError::Transport("timed out".into()));
    let mut monitor = s
        .payment
        .start_status_monitoring(INTERVAL)
        .expect("monitor");

    match monitor.next().await {
        Some(MonitorEvent::PollError(e)) => assert!(e.is_transient()),
        other => panic!("expected poll error, got {other:?}"),
    }
    assert!(matches!(
        monitor.next().await,
        Some(MonitorEvent::StatusChanged(PaymentStatus::Created))
    ));
    monitor.cancel();
    assert!(monitor.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_monitor_stops_polling() {
    let mut s = Scenario::new().await.expect("scenario");
    let mut monitor = s
        .payment
        .start_status_monitoring(INTERVAL)
        .expect("monitor");
    assert!(matches!(
        monitor.next_event().await,
        Some(MonitorEvent::StatusChanged(PaymentStatus::Created))
    ));

    monitor.cancel();
    assert!(monitor.is_cancelled());
    let polls = s.ledger.polls();

    s.purchase.create_purchase_request().await.expect("purchase");
    s.ledger.settle(&s.id);
    tokio::time::sleep(INTERVAL * 5).await;

    assert_eq!(s.ledger.polls(), polls);
    assert!(monitor.next_event().await.is_none());
    assert_eq!(s.payment.status(), Some(PaymentStatus::Created));
}
