//! Buyer-side flows against the shared ledger.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::{job_input, Scenario, AGENT, PURCHASER, SELLER_VKEY};
use masumi_client::client::wire::Amount;
use masumi_client::{
    hash_input, Error, PaymentStatus, Purchase, PurchaseRequest, PurchaseStatus, PurchaserId,
    ServiceError,
};
use serde_json::json;

#[tokio::test]
async fn test_buyer_hash_matches_seller() {
    let mut s = Scenario::new().await.expect("scenario");
    let status = s
        .purchase
        .create_purchase_request()
        .await
        .expect("purchase");
    assert_eq!(status, PurchaseStatus::Created);

    let purchaser = PurchaserId::parse(PURCHASER).expect("purchaser");
    let expected = hash_input(&job_input(), &purchaser).expect("hash");
    assert_eq!(s.purchase.input_hash(), Some(expected));
    assert_eq!(s.payment.input_hash(), Some(expected));
}

#[tokio::test]
async fn test_tampered_input_is_rejected() {
    let s = Scenario::new().await.expect("scenario");
    let mut purchase = Purchase::new(
        s.ledger.clone(),
        PurchaseRequest::new(
            &s.id,
            SELLER_VKEY,
            AGENT,
            PURCHASER,
            *s.payment.schedule(),
            json!({"text": "Analyze the sentiment of this review!", "language": "en"}),
        ),
    );
    let err = purchase
        .create_purchase_request()
        .await
        .expect_err("input mismatch");
    assert!(matches!(err, Error::Service(ServiceError::Rejected { .. })));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_priced_purchase_must_offer_seller_amounts() {
    let mut s = Scenario::priced(vec![Amount::lovelace(10_000_000)])
        .await
        .expect("scenario");
    let mut cheap = Purchase::new(
        s.ledger.clone(),
        PurchaseRequest::new(
            &s.id,
            SELLER_VKEY,
            AGENT,
            PURCHASER,
            *s.payment.schedule(),
            job_input(),
        )
        .with_amount(Amount::lovelace(1)),
    );
    let err = cheap.create_purchase_request().await.expect_err("underpaid");
    assert!(matches!(err, Error::Service(ServiceError::Rejected { .. })));

    assert_eq!(
        s.purchase.create_purchase_request().await.expect("purchase"),
        PurchaseStatus::Created
    );
}

#[tokio::test]
async fn test_unknown_escrow_is_not_found() {
    let s = Scenario::new().await.expect("scenario");
    let mut purchase = Purchase::new(
        s.ledger.clone(),
        PurchaseRequest::new(
            "escrow-9999",
            SELLER_VKEY,
            AGENT,
            PURCHASER,
            *s.payment.schedule(),
            job_input(),
        ),
    );
    let err = purchase.create_purchase_request().await.expect_err("unknown");
    assert!(matches!(err, Error::Service(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn test_funds_lock_in_flight_is_paid() {
    let mut s = Scenario::new().await.expect("scenario");
    s.purchase.create_purchase_request().await.expect("purchase");
    s.ledger.begin_funds_lock(&s.id);
    assert_eq!(
        s.purchase.check_purchase_status().await.expect("check"),
        PurchaseStatus::Paid
    );
    // Not refundable until the funds are confirmed.
    let err = s.purchase.request_refund().await.expect_err("not locked");
    assert!(matches!(err, Error::InvalidState { .. }));
}

#[tokio::test]
async fn test_cancelled_refund_restores_both_sides() {
    let mut s = Scenario::new().await.expect("scenario");
    s.lock_funds().await.expect("lock funds");

    s.purchase.request_refund().await.expect("request refund");
    s.ledger.settle(&s.id);
    assert_eq!(
        s.payment.check_payment_status().await.expect("check"),
        PaymentStatus::RefundRequested
    );

    s.purchase.cancel_refund_request().await.expect("cancel");
    assert_eq!(s.purchase.status(), Some(PurchaseStatus::AwaitingResult));
    s.ledger.settle(&s.id);
    assert_eq!(
        s.purchase.check_purchase_status().await.expect("check"),
        PurchaseStatus::AwaitingResult
    );
    assert_eq!(
        s.payment.check_payment_status().await.expect("check"),
        PaymentStatus::PaymentConfirmed
    );
}

#[tokio::test]
async fn test_cancel_after_authorization_is_invalid_state() {
    let mut s = Scenario::new().await.expect("scenario");
    s.lock_funds().await.expect("lock funds");
    s.purchase.request_refund().await.expect("request refund");
    s.ledger.settle(&s.id);
    s.payment.check_payment_status().await.expect("check");
    s.payment.authorize_refund(&s.id).await.expect("authorize");
    assert_eq!(
        s.purchase.check_purchase_status().await.expect("check"),
        PurchaseStatus::RefundAuthorized
    );

    let err = s
        .purchase
        .cancel_refund_request()
        .await
        .expect_err("already authorized");
    assert!(matches!(
        err,
        Error::InvalidState {
            operation: "cancel refund request",
            ..
        }
    ));
    // Nothing was sent: the authorization is still pending on the ledger.
    let record = s.ledger.record(&s.id).expect("record");
    assert!(record.requested_action().is_authorize_refund());
}

#[tokio::test]
async fn test_cancel_without_refund_is_invalid_state() {
    let mut s = Scenario::new().await.expect("scenario");
    s.lock_funds().await.expect("lock funds");
    let polls = s.ledger.polls();
    let err = s
        .purchase
        .cancel_refund_request()
        .await
        .expect_err("nothing to cancel");
    assert_eq!(
        err.to_string(),
        "cannot cancel refund request while AwaitingResult"
    );
    assert_eq!(s.ledger.polls(), polls);
}

#[tokio::test]
async fn test_status_fetch_failure_surfaces() {
    let mut s = Scenario::new().await.expect("scenario");
    s.purchase.create_purchase_request().await.expect("purchase");
    s.ledger.fail_next(ServiceError::Transport("connection reset".into()));
    let err = s
        .purchase
        .check_purchase_status()
        .await
        .expect_err("transport");
    assert!(err.is_transient());
    assert_eq!(s.purchase.status(), Some(PurchaseStatus::Created));
}
