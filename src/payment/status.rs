//! Seller-side lifecycle states.

use crate::client::wire::{EscrowRecord, OnChainState};
use crate::monitor::LifecycleStatus;
use crate::schedule::DeadlineSchedule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a payment request as seen by the seller.
///
/// ```text
/// Created ─► PaymentConfirmed ─► ResultSubmitted ─► Unlocked
///    │             │                    │
///    ▼             ├──► RefundRequested ─┴─► Disputed ─► Resolved
/// Expired          │          │
///                  ▼          ▼
///               Expired   RefundAuthorized ─► Refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Registered with the service; buyer funds not locked yet.
    Created,
    /// Buyer funds are locked; work may start.
    PaymentConfirmed,
    /// Output hash submitted.
    ResultSubmitted,
    /// Buyer asked for a refund; awaiting seller authorization.
    RefundRequested,
    /// Seller approved the refund; settlement pending.
    RefundAuthorized,
    /// Refund request conflicts with a submitted result.
    Disputed,
    /// Seller withdrew the funds.
    Unlocked,
    /// Buyer withdrew the refund.
    Refunded,
    /// Dispute settled.
    Resolved,
    /// A deadline passed without the required action.
    Expired,
    /// The service rejected the locked funds or datum.
    Invalid,
}

impl PaymentStatus {
    /// Derive the status from the service record at time `now`.
    ///
    /// Deadlines only matter while an action is still outstanding: a
    /// payment never funded by `pay_by_time`, or a funded one with no result
    /// by `submit_result_time`, is [`Expired`](Self::Expired).
    #[must_use]
    pub fn derive(record: &EscrowRecord, schedule: &DeadlineSchedule, now: DateTime<Utc>) -> Self {
        let action = record.requested_action();
        match record.on_chain_state {
            None if schedule.payment_window_closed(now) => Self::Expired,
            None => Self::Created,
            Some(OnChainState::FundsLocked) if action.is_submit_result() => Self::ResultSubmitted,
            Some(
                OnChainState::FundsLocked
                | OnChainState::ResultSubmitted
                | OnChainState::RefundRequested
                | OnChainState::Disputed,
            ) if action.is_authorize_refund() => Self::RefundAuthorized,
            Some(OnChainState::FundsLocked) if schedule.result_window_closed(now) => Self::Expired,
            Some(OnChainState::FundsLocked) => Self::PaymentConfirmed,
            Some(OnChainState::ResultSubmitted) => Self::ResultSubmitted,
            Some(OnChainState::RefundRequested) => Self::RefundRequested,
            Some(OnChainState::Disputed) => Self::Disputed,
            Some(OnChainState::Withdrawn) => Self::Unlocked,
            Some(OnChainState::RefundWithdrawn) => Self::Refunded,
            Some(OnChainState::DisputedWithdrawn) => Self::Resolved,
            Some(OnChainState::FundsOrDatumInvalid) => Self::Invalid,
        }
    }

    /// True while a buyer refund request awaits the seller.
    #[must_use]
    pub const fn refund_outstanding(self) -> bool {
        matches!(self, Self::RefundRequested | Self::Disputed)
    }
}

impl LifecycleStatus for PaymentStatus {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Unlocked | Self::Refunded | Self::Resolved | Self::Expired | Self::Invalid
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
