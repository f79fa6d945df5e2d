//! In-memory ledger shared by the seller and buyer sides of a test.
//!
//! `TestLedger` implements [`PaymentService`] the way the real payment
//! service behaves from a client's point of view: calls queue a
//! `requestedAction`, and the test decides when the ledger confirms it with
//! [`TestLedger::settle`]. Seller and buyer see the same escrow record.

use async_trait::async_trait;
use chrono::Utc;
use masumi_client::client::wire::{
    Amount, CreatePaymentBody, CreatePurchaseBody, EscrowActionBody, EscrowRecord, OnChainState,
    RequestedAction, SubmitResultBody,
};
use masumi_client::config::{DeadlineWindows, Network};
use masumi_client::{
    DeadlineSchedule, Error, Payment, PaymentRequest, PaymentService, Purchase, PurchaseRequest,
    Result, ServiceError,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Purchaser identifier used by the scenario buyer.
pub const PURCHASER: &str = "abc123def456abc123def456ab";

/// Seller agent used by the scenario.
pub const AGENT: &str = "agent-sentiment-1";

/// Seller wallet key used by the scenario buyer.
pub const SELLER_VKEY: &str = "5e11e7b1c0ffee00";

#[derive(Debug)]
struct Escrow {
    record: EscrowRecord,
    amounts: Vec<Amount>,
    purchased: bool,
}

#[derive(Default)]
struct LedgerState {
    escrows: HashMap<String, Escrow>,
    next_id: u64,
    fail_next: Option<ServiceError>,
    polls: u64,
}

/// Shared in-memory payment service.
#[derive(Default)]
pub struct TestLedger {
    state: Mutex<LedgerState>,
}

fn rejected(body: impl Into<String>) -> Error {
    ServiceError::Rejected {
        status: 400,
        body: body.into(),
    }
    .into()
}

impl TestLedger {
    /// Create an empty ledger.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next call with `err`.
    pub fn fail_next(&self, err: ServiceError) {
        self.state.lock().fail_next = Some(err);
    }

    /// Number of status fetches served so far.
    pub fn polls(&self) -> u64 {
        self.state.lock().polls
    }

    /// Current record of an escrow.
    pub fn record(&self, id: &str) -> Option<EscrowRecord> {
        self.state.lock().escrows.get(id).map(|e| e.record.clone())
    }

    /// Mark the buyer's funds lock transaction as submitted.
    pub fn begin_funds_lock(&self, id: &str) {
        self.update(id, |r| r.next_action.requested_action = RequestedAction::FundsLockingInitiated);
    }

    /// Confirm the pending action on the ledger.
    pub fn settle(&self, id: &str) {
        self.update(id, |r| {
            let state = r.on_chain_state;
            let next = match r.requested_action() {
                RequestedAction::FundsLockingRequested | RequestedAction::FundsLockingInitiated => {
                    Some(OnChainState::FundsLocked)
                }
                RequestedAction::SubmitResultRequested | RequestedAction::SubmitResultInitiated => {
                    Some(if state == Some(OnChainState::RefundRequested) {
                        OnChainState::Disputed
                    } else {
                        OnChainState::ResultSubmitted
                    })
                }
                RequestedAction::SetRefundRequestedRequested
                | RequestedAction::SetRefundRequestedInitiated => Some(if r.result_hash.is_some() {
                    OnChainState::Disputed
                } else {
                    OnChainState::RefundRequested
                }),
                RequestedAction::UnSetRefundRequestedRequested
                | RequestedAction::UnSetRefundRequestedInitiated => Some(if r.result_hash.is_some() {
                    OnChainState::ResultSubmitted
                } else {
                    OnChainState::FundsLocked
                }),
                RequestedAction::AuthorizeRefundRequested
                | RequestedAction::AuthorizeRefundInitiated => Some(OnChainState::RefundWithdrawn),
                _ => state,
            };
            debug!("Ledger settles {}: {state:?} -> {next:?}", r.blockchain_identifier);
            r.on_chain_state = next;
            r.next_action.requested_action = RequestedAction::Idle;
        });
    }

    /// Seller collects the funds.
    pub fn withdraw(&self, id: &str) {
        self.force(id, Some(OnChainState::Withdrawn), RequestedAction::Idle);
    }

    /// Overwrite the escrow state.
    pub fn force(&self, id: &str, state: Option<OnChainState>, action: RequestedAction) {
        self.update(id, |r| {
            r.on_chain_state = state;
            r.next_action.requested_action = action;
        });
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut EscrowRecord)) {
        if let Some(escrow) = self.state.lock().escrows.get_mut(id) {
            f(&mut escrow.record);
        }
    }

    /// Run `f` against one escrow, honouring a queued failure.
    fn call(
        &self,
        id: &str,
        f: impl FnOnce(&mut Escrow) -> Result<()>,
    ) -> Result<EscrowRecord> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_next.take() {
            return Err(err.into());
        }
        let escrow = state
            .escrows
            .get_mut(id)
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        f(escrow)?;
        Ok(escrow.record.clone())
    }

    fn fetch(&self, id: &str, purchase: bool) -> Result<EscrowRecord> {
        self.state.lock().polls += 1;
        self.call(id, |escrow| {
            if purchase && !escrow.purchased {
                return Err(ServiceError::NotFound(escrow.record.blockchain_identifier.clone()).into());
            }
            Ok(())
        })
    }
}

#[async_trait]
impl PaymentService for TestLedger {
    async fn create_payment(&self, body: &CreatePaymentBody) -> Result<EscrowRecord> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_next.take() {
            return Err(err.into());
        }
        state.next_id += 1;
        let mut record =
            EscrowRecord::new(format!("escrow-{:04}", state.next_id)).with_schedule(&body.schedule);
        record.agent_identifier = Some(body.agent_identifier.clone());
        record.identifier_from_purchaser = Some(body.identifier_from_purchaser.clone());
        record.input_hash = Some(body.input_hash);
        record.next_action.requested_action = RequestedAction::WaitingForExternalAction;
        state.escrows.insert(
            record.blockchain_identifier.clone(),
            Escrow {
                record: record.clone(),
                amounts: body.amounts.clone(),
                purchased: false,
            },
        );
        Ok(record)
    }

    async fn payment_record(&self, _network: Network, id: &str) -> Result<EscrowRecord> {
        self.fetch(id, false)
    }

    async fn submit_result(&self, body: &SubmitResultBody) -> Result<EscrowRecord> {
        self.call(&body.blockchain_identifier, |escrow| {
            let r = &mut escrow.record;
            if !matches!(
                r.on_chain_state,
                Some(OnChainState::FundsLocked | OnChainState::RefundRequested)
            ) {
                return Err(rejected("funds are not locked"));
            }
            r.result_hash = Some(body.submit_result_hash);
            r.next_action.requested_action = RequestedAction::SubmitResultRequested;
            Ok(())
        })
    }

    async fn authorize_refund(&self, body: &EscrowActionBody) -> Result<EscrowRecord> {
        self.call(&body.blockchain_identifier, |escrow| {
            let r = &mut escrow.record;
            if !matches!(
                r.on_chain_state,
                Some(OnChainState::RefundRequested | OnChainState::Disputed)
            ) {
                return Err(rejected("no refund requested"));
            }
            r.next_action.requested_action = RequestedAction::AuthorizeRefundRequested;
            Ok(())
        })
    }

    async fn create_purchase(&self, body: &CreatePurchaseBody) -> Result<EscrowRecord> {
        self.call(&body.blockchain_identifier, |escrow| {
            let r = &mut escrow.record;
            if escrow.purchased {
                return Err(rejected("already purchased"));
            }
            if body.schedule.payment_window_closed(Utc::now()) {
                return Err(rejected("payment request past payByTime"));
            }
            if r.input_hash != Some(body.input_hash) {
                return Err(rejected("inputHash does not match the payment request"));
            }
            if !escrow.amounts.is_empty() && escrow.amounts != body.amounts {
                return Err(rejected("amounts do not match the payment request"));
            }
            if r.schedule()? != body.schedule {
                return Err(rejected("deadlines do not match the payment request"));
            }
            r.next_action.requested_action = RequestedAction::FundsLockingRequested;
            escrow.purchased = true;
            Ok(())
        })
    }

    async fn purchase_record(&self, _network: Network, id: &str) -> Result<EscrowRecord> {
        self.fetch(id, true)
    }

    async fn request_refund(&self, body: &EscrowActionBody) -> Result<EscrowRecord> {
        self.call(&body.blockchain_identifier, |escrow| {
            let r = &mut escrow.record;
            if !matches!(
                r.on_chain_state,
                Some(OnChainState::FundsLocked | OnChainState::ResultSubmitted)
            ) {
                return Err(rejected("refund not possible in this state"));
            }
            r.next_action.requested_action = RequestedAction::SetRefundRequestedRequested;
            Ok(())
        })
    }

    async fn cancel_refund_request(&self, body: &EscrowActionBody) -> Result<EscrowRecord> {
        self.call(&body.blockchain_identifier, |escrow| {
            let r = &mut escrow.record;
            if r.requested_action().is_authorize_refund() {
                return Err(rejected("refund already authorized"));
            }
            let pending = r.requested_action().is_set_refund_requested();
            let requested = matches!(
                r.on_chain_state,
                Some(OnChainState::RefundRequested | OnChainState::Disputed)
            );
            if !pending && !requested {
                return Err(rejected("no refund request to cancel"));
            }
            r.next_action.requested_action = RequestedAction::UnSetRefundRequestedRequested;
            Ok(())
        })
    }
}

/// Job input used by the scenario.
pub fn job_input() -> Value {
    json!({"text": "Analyze the sentiment of this review", "language": "en"})
}

/// Job output used by the scenario.
pub fn job_output() -> Value {
    json!({"sentiment": "positive", "confidence": 0.95})
}

/// A seller and a buyer sharing one escrow.
pub struct Scenario {
    /// Shared ledger.
    pub ledger: Arc<TestLedger>,
    /// Seller side.
    pub payment: Payment,
    /// Buyer side.
    pub purchase: Purchase,
    /// Escrow identifier.
    pub id: String,
}

impl Scenario {
    /// Seller creates a payment request with default windows; the buyer
    /// prepares (but does not yet create) the matching purchase.
    pub async fn new() -> Result<Self> {
        let request = PaymentRequest::with_windows(
            AGENT,
            PURCHASER,
            job_input(),
            &DeadlineWindows::default(),
        )?;
        Self::with_request(request).await
    }

    /// As [`Scenario::new`] with a priced request; the buyer offers the
    /// same amounts.
    pub async fn priced(amounts: Vec<Amount>) -> Result<Self> {
        let mut request = PaymentRequest::with_windows(
            AGENT,
            PURCHASER,
            job_input(),
            &DeadlineWindows::default(),
        )?;
        request.amounts = amounts;
        Self::with_request(request).await
    }

    /// As [`Scenario::new`] with an explicit schedule.
    pub async fn with_schedule(schedule: DeadlineSchedule) -> Result<Self> {
        Self::with_request(PaymentRequest::new(AGENT, PURCHASER, job_input(), schedule)).await
    }

    async fn with_request(request: PaymentRequest) -> Result<Self> {
        let ledger = TestLedger::new();
        let schedule = request.schedule;
        let request_amounts = request.amounts.clone();
        let mut payment = Payment::new(ledger.clone(), request);
        let id = payment.create_payment_request().await?;

        let mut purchase_request =
            PurchaseRequest::new(&id, SELLER_VKEY, AGENT, PURCHASER, schedule, job_input());
        purchase_request.amounts = request_amounts;
        let purchase = Purchase::new(ledger.clone(), purchase_request);
        Ok(Self {
            ledger,
            payment,
            purchase,
            id,
        })
    }

    /// Buyer purchases and the ledger locks the funds.
    pub async fn lock_funds(&mut self) -> Result<()> {
        self.purchase.create_purchase_request().await?;
        self.ledger.settle(&self.id);
        self.payment.check_payment_status().await?;
        self.purchase.check_purchase_status().await?;
        Ok(())
    }
}
