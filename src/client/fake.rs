//! Single-escrow in-memory service for unit tests.

use crate::client::wire::{
    CreatePaymentBody, CreatePurchaseBody, EscrowActionBody, EscrowRecord, OnChainState,
    RequestedAction, SubmitResultBody,
};
use crate::client::PaymentService;
use crate::config::Network;
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

pub(crate) const ESCROW_ID: &str = "escrow-1";

#[derive(Default)]
pub(crate) struct FakeService {
    record: Mutex<Option<EscrowRecord>>,
    calls: Mutex<Vec<&'static str>>,
    fail_next: Mutex<Option<ServiceError>>,
}

impl FakeService {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub(crate) fn fail_next(&self, err: ServiceError) {
        *self.fail_next.lock() = Some(err);
    }

    pub(crate) fn seed(&self, record: EscrowRecord) {
        *self.record.lock() = Some(record);
    }

    pub(crate) fn set_state(&self, state: Option<OnChainState>, action: RequestedAction) {
        if let Some(record) = self.record.lock().as_mut() {
            record.on_chain_state = state;
            record.next_action.requested_action = action;
        }
    }

    fn apply(
        &self,
        call: &'static str,
        update: impl FnOnce(&mut Option<EscrowRecord>),
    ) -> Result<EscrowRecord> {
        self.calls.lock().push(call);
        if let Some(err) = self.fail_next.lock().take() {
            return Err(err.into());
        }
        let mut slot = self.record.lock();
        update(&mut slot);
        slot.clone()
            .ok_or_else(|| ServiceError::NotFound(ESCROW_ID.to_string()).into())
    }

    fn act(&self, call: &'static str, id: &str, action: RequestedAction) -> Result<EscrowRecord> {
        let id = id.to_string();
        self.apply(call, move |slot| {
            if let Some(record) = slot.as_mut().filter(|r| r.blockchain_identifier == id) {
                record.next_action.requested_action = action;
            }
        })
    }
}

#[async_trait]
impl PaymentService for FakeService {
    async fn create_payment(&self, body: &CreatePaymentBody) -> Result<EscrowRecord> {
        self.apply("create_payment", |slot| {
            let mut record = EscrowRecord::new(ESCROW_ID).with_schedule(&body.schedule);
            record.input_hash = Some(body.input_hash);
            record.next_action.requested_action = RequestedAction::WaitingForExternalAction;
            *slot = Some(record);
        })
    }

    async fn payment_record(&self, _network: Network, _id: &str) -> Result<EscrowRecord> {
        self.apply("payment_record", |_| {})
    }

    async fn submit_result(&self, body: &SubmitResultBody) -> Result<EscrowRecord> {
        let hash = body.submit_result_hash;
        self.apply("submit_result", |slot| {
            if let Some(record) = slot.as_mut() {
                record.result_hash = Some(hash);
                record.next_action.requested_action = RequestedAction::SubmitResultRequested;
            }
        })
    }

    async fn authorize_refund(&self, body: &EscrowActionBody) -> Result<EscrowRecord> {
        self.act(
            "authorize_refund",
            &body.blockchain_identifier,
            RequestedAction::AuthorizeRefundRequested,
        )
    }

    async fn create_purchase(&self, body: &CreatePurchaseBody) -> Result<EscrowRecord> {
        self.apply("create_purchase", |slot| {
            let mut record =
                EscrowRecord::new(body.blockchain_identifier.clone()).with_schedule(&body.schedule);
            record.input_hash = Some(body.input_hash);
            record.next_action.requested_action = RequestedAction::FundsLockingRequested;
            *slot = Some(record);
        })
    }

    async fn purchase_record(&self, _network: Network, _id: &str) -> Result<EscrowRecord> {
        self.apply("purchase_record", |_| {})
    }

    async fn request_refund(&self, body: &EscrowActionBody) -> Result<EscrowRecord> {
        self.act(
            "request_refund",
            &body.blockchain_identifier,
            RequestedAction::SetRefundRequestedRequested,
        )
    }

    async fn cancel_refund_request(&self, body: &EscrowActionBody) -> Result<EscrowRecord> {
        self.act(
            "cancel_refund_request",
            &body.blockchain_identifier,
            RequestedAction::UnSetRefundRequestedRequested,
        )
    }
}
