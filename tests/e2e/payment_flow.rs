//! Seller-side flows against the shared ledger.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::{job_output, Scenario};
use chrono::{Duration as ChronoDuration, Utc};
use masumi_client::client::wire::{OnChainState, RequestedAction};
use masumi_client::{DeadlineSchedule, Error, PaymentStatus, PurchaseStatus, ServiceError};

#[tokio::test]
async fn test_happy_path_unlocks_both_sides() {
    let mut s = Scenario::new().await.expect("scenario");
    assert_eq!(s.payment.status(), Some(PaymentStatus::Created));

    s.lock_funds().await.expect("lock funds");
    assert_eq!(s.payment.status(), Some(PaymentStatus::PaymentConfirmed));
    assert_eq!(s.purchase.status(), Some(PurchaseStatus::AwaitingResult));
    assert_eq!(s.payment.input_hash(), s.purchase.input_hash());

    let output = job_output();
    let hash = s
        .payment
        .complete_with_output(&s.id, &output)
        .await
        .expect("complete");
    assert_eq!(s.payment.status(), Some(PaymentStatus::ResultSubmitted));

    s.ledger.settle(&s.id);
    assert_eq!(
        s.purchase.check_purchase_status().await.expect("check"),
        PurchaseStatus::ResultReceived
    );
    let received = s.purchase.result_hash().expect("result hash");
    assert_eq!(received, hash);
    assert!(received.matches_output(&output).expect("verify"));

    s.ledger.withdraw(&s.id);
    assert_eq!(
        s.payment.check_payment_status().await.expect("check"),
        PaymentStatus::Unlocked
    );
    assert_eq!(
        s.purchase.check_purchase_status().await.expect("check"),
        PurchaseStatus::Unlocked
    );
}

#[tokio::test]
async fn test_complete_requires_locked_funds() {
    let mut s = Scenario::new().await.expect("scenario");
    let err = s
        .payment
        .complete_with_output(&s.id, &job_output())
        .await
        .expect_err("not confirmed");
    assert_eq!(err.to_string(), "cannot complete payment while Created");
    assert!(s.ledger.record(&s.id).expect("record").result_hash.is_none());
}

#[tokio::test]
async fn test_refund_authorized_by_seller() {
    let mut s = Scenario::new().await.expect("scenario");
    s.lock_funds().await.expect("lock funds");

    s.purchase.request_refund().await.expect("request refund");
    s.ledger.settle(&s.id);
    assert_eq!(
        s.payment.check_payment_status().await.expect("check"),
        PaymentStatus::RefundRequested
    );

    s.payment.authorize_refund(&s.id).await.expect("authorize");
    assert_eq!(
        s.payment.check_payment_status().await.expect("check"),
        PaymentStatus::RefundAuthorized
    );

    s.ledger.settle(&s.id);
    assert_eq!(
        s.payment.check_payment_status().await.expect("check"),
        PaymentStatus::Refunded
    );
    assert_eq!(
        s.purchase.check_purchase_status().await.expect("check"),
        PurchaseStatus::Refunded
    );
}

#[tokio::test]
async fn test_refund_after_result_is_disputed() {
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
    assert_eq!(
        s.payment.check_payment_status().await.expect("check"),
        PaymentStatus::Disputed
    );
    // Until the seller answers, the buyer's request is still pending.
    assert_eq!(
        s.purchase.check_purchase_status().await.expect("check"),
        PurchaseStatus::RefundRequested
    );

    // The seller may still give in.
    s.payment.authorize_refund(&s.id).await.expect("authorize");
    assert_eq!(s.payment.status(), Some(PaymentStatus::RefundAuthorized));
    assert_eq!(
        s.purchase.check_purchase_status().await.expect("check"),
        PurchaseStatus::RefundAuthorized
    );
    s.ledger.settle(&s.id);
    assert_eq!(
        s.purchase.check_purchase_status().await.expect("check"),
        PurchaseStatus::Refunded
    );
}

#[tokio::test]
async fn test_buyer_withdraws_disputed_refund() {
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
    assert_eq!(
        s.purchase.check_purchase_status().await.expect("check"),
        PurchaseStatus::RefundRequested
    );

    s.purchase.cancel_refund_request().await.expect("cancel");
    assert_eq!(s.purchase.status(), Some(PurchaseStatus::ResultReceived));
    s.ledger.settle(&s.id);
    assert_eq!(
        s.payment.check_payment_status().await.expect("check"),
        PaymentStatus::ResultSubmitted
    );
}

#[tokio::test]
async fn test_dispute_resolution_is_terminal() {
    let mut s = Scenario::new().await.expect("scenario");
    s.lock_funds().await.expect("lock funds");
    s.ledger
        .force(&s.id, Some(OnChainState::DisputedWithdrawn), RequestedAction::Idle);
    assert_eq!(
        s.payment.check_payment_status().await.expect("check"),
        PaymentStatus::Resolved
    );
    let err = s.payment.authorize_refund(&s.id).await.expect_err("settled");
    assert!(matches!(err, Error::InvalidState { .. }));
}

#[tokio::test]
async fn test_unfunded_request_expires() {
    let now = Utc::now();
    let schedule = DeadlineSchedule::new(
        now - ChronoDuration::seconds(1),
        now + ChronoDuration::seconds(60),
        now + ChronoDuration::seconds(120),
        now + ChronoDuration::seconds(180),
    )
    .expect("ordered");
    let mut s = Scenario::with_schedule(schedule).await.expect("scenario");
    assert_eq!(
        s.payment.check_payment_status().await.expect("check"),
        PaymentStatus::Expired
    );

    let err = s
        .purchase
        .create_purchase_request()
        .await
        .expect_err("past pay-by");
    assert!(matches!(
        err,
        Error::Service(ServiceError::Rejected { status: 400, .. })
    ));
    assert_eq!(s.purchase.status(), None);
}

#[tokio::test]
async fn test_resumed_payment_completes() {
    let mut s = Scenario::new().await.expect("scenario");
    s.lock_funds().await.expect("lock funds");

    let mut resumed =
        masumi_client::Payment::resume(s.ledger.clone(), s.payment.network(), &s.id)
            .await
            .expect("resume");
    assert_eq!(resumed.status(), Some(PaymentStatus::PaymentConfirmed));
    assert_eq!(resumed.schedule(), s.payment.schedule());
    resumed
        .complete_with_output(&s.id, &job_output())
        .await
        .expect("complete");

    assert_eq!(
        s.payment.check_payment_status().await.expect("check"),
        PaymentStatus::ResultSubmitted
    );
}
