//! Buyer-side purchase lifecycle.
//!
//! A [`Purchase`] pays into the escrow the seller created, watches for the
//! result and can ask for (and take back) a refund before the seller
//! authorizes it.

mod request;
mod status;

pub use request::PurchaseRequest;
pub use status::PurchaseStatus;

use crate::client::wire::{Amount, CreatePurchaseBody, EscrowActionBody, EscrowRecord, PaymentType};
use crate::client::PaymentService;
use crate::config::Network;
use crate::error::{Error, Result, ServiceError};
use crate::identifier::{require_hex, require_non_empty, PurchaserId};
use crate::integrity::{hash_input, IntegrityHash};
use crate::monitor::StatusMonitor;
use crate::schedule::DeadlineSchedule;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct PurchaseState {
    blockchain_identifier: Option<String>,
    status: Option<PurchaseStatus>,
    input_hash: Option<IntegrityHash>,
    result_hash: Option<IntegrityHash>,
    /// Status to return to if the pending refund request is cancelled.
    refund_origin: Option<PurchaseStatus>,
}

impl PurchaseState {
    fn apply(&mut self, record: &EscrowRecord) -> PurchaseStatus {
        let status = PurchaseStatus::derive(record, Utc::now());
        self.refund_origin = match status {
            PurchaseStatus::RefundRequested | PurchaseStatus::RefundAuthorized => {
                Some(PurchaseStatus::before_refund(record))
            }
            _ => None,
        };
        if record.result_hash.is_some() {
            self.result_hash = record.result_hash;
        }
        self.status = Some(status);
        status
    }
}

/// Buyer-side escrow.
pub struct Purchase {
    service: Arc<dyn PaymentService>,
    network: Network,
    schedule: DeadlineSchedule,
    request: Option<PurchaseRequest>,
    state: Arc<RwLock<PurchaseState>>,
}

impl Purchase {
    /// Prepare a purchase. Nothing is sent until
    /// [`create_purchase_request`](Self::create_purchase_request).
    #[must_use]
    pub fn new(service: Arc<dyn PaymentService>, request: PurchaseRequest) -> Self {
        Self {
            service,
            network: request.network,
            schedule: request.schedule,
            request: Some(request),
            state: Arc::new(RwLock::new(PurchaseState::default())),
        }
    }

    /// Pick up an existing purchase.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Service`] if the record cannot be fetched or lacks
    /// its deadlines.
    pub async fn resume(
        service: Arc<dyn PaymentService>,
        network: Network,
        blockchain_identifier: &str,
    ) -> Result<Self> {
        require_non_empty("blockchainIdentifier", blockchain_identifier)?;
        let record = service.purchase_record(network, blockchain_identifier).await?;
        let schedule = record.schedule()?;

        let mut state = PurchaseState {
            blockchain_identifier: Some(record.blockchain_identifier.clone()),
            input_hash: record.input_hash,
            ..PurchaseState::default()
        };
        let status = state.apply(&record);
        info!("Resumed purchase {blockchain_identifier} in state {status}");

        Ok(Self {
            service,
            network,
            schedule,
            request: None,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Create the purchase and lock funds in the seller's escrow.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a malformed purchaser identifier, seller
    ///   key, agent, blockchain identifier or amount (no remote call is made)
    /// - [`Error::Encoding`] if the input cannot be hashed
    /// - [`Error::InvalidState`] if the purchase was already created
    /// - [`Error::Service`] if the service rejects it, e.g. because the
    ///   seller's escrow is past its pay-by time
    pub async fn create_purchase_request(&mut self) -> Result<PurchaseStatus> {
        const OP: &str = "create purchase request";
        let request = match (&self.request, self.blockchain_identifier()) {
            (Some(request), None) => request,
            _ => return Err(Error::invalid_state(OP, status_label(self.status()))),
        };

        require_non_empty("blockchainIdentifier", &request.blockchain_identifier)?;
        require_hex("sellerVkey", &request.seller_vkey)?;
        require_non_empty("agentIdentifier", &request.agent_identifier)?;
        let purchaser = PurchaserId::parse(&request.identifier_from_purchaser)?;
        request.amounts.iter().try_for_each(Amount::validate)?;
        let input_hash = hash_input(&request.input_data, &purchaser)?;

        let body = CreatePurchaseBody {
            blockchain_identifier: request.blockchain_identifier.clone(),
            seller_vkey: request.seller_vkey.clone(),
            agent_identifier: request.agent_identifier.clone(),
            identifier_from_purchaser: purchaser.to_string(),
            network: request.network,
            input_hash,
            payment_type: PaymentType::default(),
            amounts: request.amounts.clone(),
            schedule: request.schedule,
            metadata: request.metadata.clone(),
        };
        debug!("Creating purchase for {}", body.blockchain_identifier);
        let record = self.service.create_purchase(&body).await?;
        if record.blockchain_identifier != body.blockchain_identifier {
            return Err(ServiceError::MalformedResponse(format!(
                "purchase for {} answered with {}",
                body.blockchain_identifier, record.blockchain_identifier
            ))
            .into());
        }

        let mut state = self.state.write();
        state.blockchain_identifier = Some(record.blockchain_identifier.clone());
        state.input_hash = Some(input_hash);
        let status = state.apply(&record);
        info!("Purchase {} created in state {status}", record.blockchain_identifier);
        Ok(status)
    }

    /// Fetch the escrow and update the local status.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] before creation, [`Error::Service`] if the
    /// fetch fails.
    pub async fn check_purchase_status(&self) -> Result<PurchaseStatus> {
        let id = self.require_created("check purchase status")?;
        refresh(self.service.as_ref(), self.network, &id, &self.state).await
    }

    /// Ask for a refund.
    ///
    /// Legal from [`PurchaseStatus::AwaitingResult`] (including after the
    /// result deadline passed) and [`PurchaseStatus::ResultReceived`]. The
    /// service decides whether the refund is actually granted.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] from any other status, [`Error::Service`] if
    /// the service rejects the request.
    pub async fn request_refund(&mut self) -> Result<()> {
        const OP: &str = "request refund";
        let id = self.require_created(OP)?;
        let status = self.status();
        let prior = match status {
            Some(s) if s.refundable() => s,
            _ => return Err(Error::invalid_state(OP, status_label(status))),
        };

        self.service.request_refund(&self.action_body(&id)).await?;

        let mut state = self.state.write();
        state.refund_origin = Some(prior);
        state.status = Some(PurchaseStatus::RefundRequested);
        info!("Purchase {id}: refund requested from {prior}");
        Ok(())
    }

    /// Withdraw a pending refund request, returning to the prior state.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless in [`PurchaseStatus::RefundRequested`],
    /// including once the seller's authorization has been observed
    /// ([`PurchaseStatus::RefundAuthorized`]). [`Error::Service`] if the
    /// service rejects the cancellation.
    pub async fn cancel_refund_request(&mut self) -> Result<()> {
        const OP: &str = "cancel refund request";
        let id = self.require_created(OP)?;
        let status = self.status();
        if status != Some(PurchaseStatus::RefundRequested) {
            return Err(Error::invalid_state(OP, status_label(status)));
        }

        self.service
            .cancel_refund_request(&self.action_body(&id))
            .await?;

        let mut state = self.state.write();
        let restored = state.refund_origin.take().unwrap_or(if state.result_hash.is_some() {
            PurchaseStatus::ResultReceived
        } else {
            PurchaseStatus::AwaitingResult
        });
        state.status = Some(restored);
        info!("Purchase {id}: refund request cancelled, back to {restored}");
        Ok(())
    }

    /// Poll the escrow every `interval`, updating this purchase's status.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] before creation.
    pub fn start_status_monitoring(&self, interval: Duration) -> Result<StatusMonitor<PurchaseStatus>> {
        let id = self.require_created("start status monitoring")?;
        let service = Arc::clone(&self.service);
        let state = Arc::clone(&self.state);
        let network = self.network;
        debug!("Monitoring purchase {id} every {interval:?}");

        Ok(StatusMonitor::spawn(
            move || {
                let service = Arc::clone(&service);
                let state = Arc::clone(&state);
                let id = id.clone();
                async move { refresh(service.as_ref(), network, &id, &state).await }
            },
            interval,
        ))
    }

    /// Escrow identifier, once the purchase is created.
    #[must_use]
    pub fn blockchain_identifier(&self) -> Option<String> {
        self.state.read().blockchain_identifier.clone()
    }

    /// Last known status; `None` before creation.
    #[must_use]
    pub fn status(&self) -> Option<PurchaseStatus> {
        self.state.read().status
    }

    /// Escrow deadlines.
    #[must_use]
    pub fn schedule(&self) -> &DeadlineSchedule {
        &self.schedule
    }

    /// Input hash sent with the purchase.
    #[must_use]
    pub fn input_hash(&self) -> Option<IntegrityHash> {
        self.state.read().input_hash
    }

    /// Result hash published by the seller, once seen.
    #[must_use]
    pub fn result_hash(&self) -> Option<IntegrityHash> {
        self.state.read().result_hash
    }

    /// Ledger environment.
    #[must_use]
    pub fn network(&self) -> Network {
        self.network
    }

    /// Request this purchase was built from; `None` when resumed.
    #[must_use]
    pub fn request(&self) -> Option<&PurchaseRequest> {
        self.request.as_ref()
    }

    fn action_body(&self, id: &str) -> EscrowActionBody {
        EscrowActionBody {
            network: self.network,
            blockchain_identifier: id.to_string(),
        }
    }

    fn require_created(&self, operation: &'static str) -> Result<String> {
        self.blockchain_identifier()
            .ok_or_else(|| Error::invalid_state(operation, status_label(None)))
    }
}

impl std::fmt::Debug for Purchase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Purchase")
            .field("network", &self.network)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

async fn refresh(
    service: &dyn PaymentService,
    network: Network,
    blockchain_identifier: &str,
    state: &RwLock<PurchaseState>,
) -> Result<PurchaseStatus> {
    let record = service.purchase_record(network, blockchain_identifier).await?;
    if record.blockchain_identifier != blockchain_identifier {
        return Err(ServiceError::MalformedResponse(format!(
            "asked for {blockchain_identifier}, got {}",
            record.blockchain_identifier
        ))
        .into());
    }

    let mut state = state.write();
    let before = state.status;
    let status = state.apply(&record);
    if before != Some(status) {
        info!("Purchase {blockchain_identifier}: {} -> {status}", status_label(before));
    }
    Ok(status)
}

fn status_label(status: Option<PurchaseStatus>) -> String {
    status.map_or_else(|| "not created".to_string(), |s| s.to_string())
}
