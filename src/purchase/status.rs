//! Buyer-side lifecycle states.

use crate::client::wire::{EscrowRecord, OnChainState, RequestedAction};
use crate::monitor::LifecycleStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a purchase as seen by the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseStatus {
    /// Purchase registered; funds lock queued.
    Created,
    /// Funds lock transaction submitted.
    Paid,
    /// Funds locked; waiting for the seller's result.
    AwaitingResult,
    /// Seller submitted a result hash.
    ResultReceived,
    /// Refund requested (or disputed against a result) and not yet
    /// authorized by the seller.
    RefundRequested,
    /// Seller authorized the refund; settlement pending.
    RefundAuthorized,
    /// Seller withdrew the funds.
    Unlocked,
    /// Refund withdrawn back to the buyer.
    Refunded,
    /// Dispute handed to external resolution.
    DisputeEscalated,
    /// The service rejected the locked funds or datum.
    Invalid,
}

impl PurchaseStatus {
    /// Derive the status from the service record at time `now`.
    ///
    /// A dispute stays a cancellable [`RefundRequested`](Self::RefundRequested)
    /// until the external dispute unlock time; after that, or once the
    /// disputed funds are withdrawn, it is
    /// [`DisputeEscalated`](Self::DisputeEscalated).
    #[must_use]
    pub fn derive(record: &EscrowRecord, now: DateTime<Utc>) -> Self {
        let action = record.requested_action();
        match record.on_chain_state {
            None if action == RequestedAction::FundsLockingInitiated => Self::Paid,
            None => Self::Created,
            Some(
                OnChainState::FundsLocked
                | OnChainState::ResultSubmitted
                | OnChainState::RefundRequested
                | OnChainState::Disputed,
            ) if action.is_authorize_refund() => Self::RefundAuthorized,
            Some(OnChainState::FundsLocked | OnChainState::ResultSubmitted)
                if action.is_set_refund_requested() =>
            {
                Self::RefundRequested
            }
            Some(OnChainState::FundsLocked) => Self::AwaitingResult,
            Some(OnChainState::ResultSubmitted) => Self::ResultReceived,
            Some(OnChainState::RefundRequested | OnChainState::Disputed)
                if action.is_unset_refund_requested() =>
            {
                Self::before_refund(record)
            }
            Some(OnChainState::RefundRequested) => Self::RefundRequested,
            Some(OnChainState::Disputed)
                if record
                    .external_dispute_unlock_time
                    .is_some_and(|t| now >= t) =>
            {
                Self::DisputeEscalated
            }
            Some(OnChainState::Disputed) => Self::RefundRequested,
            Some(OnChainState::DisputedWithdrawn) => Self::DisputeEscalated,
            Some(OnChainState::Withdrawn) => Self::Unlocked,
            Some(OnChainState::RefundWithdrawn) => Self::Refunded,
            Some(OnChainState::FundsOrDatumInvalid) => Self::Invalid,
        }
    }

    /// State a cancelled refund request on `record` returns to.
    pub(super) fn before_refund(record: &EscrowRecord) -> Self {
        let result_seen = record.result_hash.is_some()
            || matches!(
                record.on_chain_state,
                Some(OnChainState::ResultSubmitted | OnChainState::Disputed)
            );
        if result_seen {
            Self::ResultReceived
        } else {
            Self::AwaitingResult
        }
    }

    /// True if a refund may be requested from this state.
    #[must_use]
    pub const fn refundable(self) -> bool {
        matches!(self, Self::AwaitingResult | Self::ResultReceived)
    }
}

impl LifecycleStatus for PurchaseStatus {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Unlocked | Self::Refunded | Self::DisputeEscalated | Self::Invalid
        )
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
