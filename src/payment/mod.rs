//! Seller-side payment lifecycle.
//!
//! A [`Payment`] registers a payment request with the service, tracks the
//! escrow as the buyer locks funds, submits the output hash once the work is
//! done and authorizes refunds the buyer asks for.
//!
//! The remote service is authoritative. Local guards only reject calls that
//! can never succeed from the last observed status; the service may still
//! refuse a call the guards let through.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut payment = Payment::new(service, request);
//! let id = payment.create_payment_request().await?;
//!
//! let mut monitor = payment.start_status_monitoring(Duration::from_secs(30))?;
//! while let Some(event) = monitor.next_event().await {
//!     if let MonitorEvent::StatusChanged(PaymentStatus::PaymentConfirmed) = event {
//!         let output = run_job().await;
//!         payment.complete_with_output(&id, &output).await?;
//!     }
//! }
//! ```

mod request;
mod status;

pub use request::PaymentRequest;
pub use status::PaymentStatus;

use crate::client::wire::{
    Amount, CreatePaymentBody, EscrowActionBody, PaymentType, SubmitResultBody,
};
use crate::client::PaymentService;
use crate::config::Network;
use crate::error::{Error, Result, ServiceError};
use crate::identifier::{require_non_empty, PurchaserId};
use crate::integrity::{hash_input, hash_output, IntegrityHash};
use crate::monitor::StatusMonitor;
use crate::schedule::DeadlineSchedule;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Mutable part of a payment, shared with its status monitor.
#[derive(Debug, Default)]
struct PaymentState {
    blockchain_identifier: Option<String>,
    status: Option<PaymentStatus>,
    input_hash: Option<IntegrityHash>,
    result_hash: Option<IntegrityHash>,
}

/// Seller-side escrow.
pub struct Payment {
    service: Arc<dyn PaymentService>,
    network: Network,
    schedule: DeadlineSchedule,
    request: Option<PaymentRequest>,
    state: Arc<RwLock<PaymentState>>,
}

impl Payment {
    /// Prepare a payment. Nothing is sent until
    /// [`create_payment_request`](Self::create_payment_request).
    #[must_use]
    pub fn new(service: Arc<dyn PaymentService>, request: PaymentRequest) -> Self {
        Self {
            service,
            network: request.network,
            schedule: request.schedule,
            request: Some(request),
            state: Arc::new(RwLock::new(PaymentState::default())),
        }
    }

    /// Pick up an escrow created earlier, e.g. by another process.
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
        let record = service.payment_record(network, blockchain_identifier).await?;
        let schedule = record.schedule()?;
        let status = PaymentStatus::derive(&record, &schedule, Utc::now());
        info!("Resumed payment {blockchain_identifier} in state {status}");

        let state = PaymentState {
            blockchain_identifier: Some(record.blockchain_identifier),
            status: Some(status),
            input_hash: record.input_hash,
            result_hash: record.result_hash,
        };
        Ok(Self {
            service,
            network,
            schedule,
            request: None,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Register the payment request with the service.
    ///
    /// Returns the assigned blockchain identifier.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a malformed purchaser or agent identifier
    ///   or amount (no remote call is made)
    /// - [`Error::Encoding`] if the input cannot be hashed
    /// - [`Error::InvalidState`] if the request was already created
    /// - [`Error::Service`] if the service rejects it
    pub async fn create_payment_request(&mut self) -> Result<String> {
        const OP: &str = "create payment request";
        let request = match (&self.request, self.blockchain_identifier()) {
            (Some(request), None) => request,
            _ => return Err(Error::invalid_state(OP, status_label(self.status()))),
        };

        require_non_empty("agentIdentifier", &request.agent_identifier)?;
        let purchaser = PurchaserId::parse(&request.identifier_from_purchaser)?;
        request.amounts.iter().try_for_each(Amount::validate)?;
        let input_hash = hash_input(&request.input_data, &purchaser)?;

        let body = CreatePaymentBody {
            agent_identifier: request.agent_identifier.clone(),
            network: request.network,
            input_hash,
            identifier_from_purchaser: purchaser.to_string(),
            payment_type: PaymentType::default(),
            amounts: request.amounts.clone(),
            schedule: request.schedule,
            metadata: request.metadata.clone(),
        };
        debug!("Creating payment request for agent {}", body.agent_identifier);
        let record = self.service.create_payment(&body).await?;
        if record.blockchain_identifier.is_empty() {
            return Err(ServiceError::MalformedResponse(
                "payment created without a blockchainIdentifier".into(),
            )
            .into());
        }

        let mut state = self.state.write();
        state.blockchain_identifier = Some(record.blockchain_identifier.clone());
        state.status = Some(PaymentStatus::Created);
        state.input_hash = Some(input_hash);
        info!("Payment {} created", record.blockchain_identifier);
        Ok(record.blockchain_identifier)
    }

    /// Fetch the escrow and update the local status.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] before creation, [`Error::Service`] if the
    /// fetch fails.
    pub async fn check_payment_status(&self) -> Result<PaymentStatus> {
        let id = self.require_created("check payment status")?;
        refresh(
            self.service.as_ref(),
            self.network,
            &id,
            &self.schedule,
            &self.state,
        )
        .await
    }

    /// Submit the output hash as proof of completed work.
    ///
    /// Legal only from [`PaymentStatus::PaymentConfirmed`].
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `blockchain_identifier` is not this payment's
    /// - [`Error::InvalidState`] from any other status
    /// - [`Error::Service`] if the service rejects the submission
    pub async fn complete_payment(
        &mut self,
        blockchain_identifier: &str,
        result_hash: IntegrityHash,
    ) -> Result<()> {
        const OP: &str = "complete payment";
        let id = self.require_created(OP)?;
        require_same_escrow(&id, blockchain_identifier)?;
        let status = self.status();
        if status != Some(PaymentStatus::PaymentConfirmed) {
            return Err(Error::invalid_state(OP, status_label(status)));
        }

        let body = SubmitResultBody {
            network: self.network,
            blockchain_identifier: id.clone(),
            submit_result_hash: result_hash,
        };
        self.service.submit_result(&body).await?;

        let mut state = self.state.write();
        state.status = Some(PaymentStatus::ResultSubmitted);
        state.result_hash = Some(result_hash);
        info!("Payment {id}: result {result_hash} submitted");
        Ok(())
    }

    /// Hash `output` and submit it with [`complete_payment`](Self::complete_payment).
    ///
    /// Returns the submitted hash so it can be handed to the buyer.
    ///
    /// # Errors
    ///
    /// As [`complete_payment`](Self::complete_payment), plus
    /// [`Error::Encoding`] if the output cannot be hashed.
    pub async fn complete_with_output<T: Serialize + ?Sized + Sync>(
        &mut self,
        blockchain_identifier: &str,
        output: &T,
    ) -> Result<IntegrityHash> {
        let hash = hash_output(output)?;
        self.complete_payment(blockchain_identifier, hash).await?;
        Ok(hash)
    }

    /// Approve the buyer's outstanding refund request.
    ///
    /// Legal only while a refund request is observed, i.e. from
    /// [`PaymentStatus::RefundRequested`] or [`PaymentStatus::Disputed`].
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `blockchain_identifier` is not this payment's
    /// - [`Error::InvalidState`] if no refund request is outstanding
    /// - [`Error::Service`] if the service rejects the authorization
    pub async fn authorize_refund(&mut self, blockchain_identifier: &str) -> Result<()> {
        const OP: &str = "authorize refund";
        let id = self.require_created(OP)?;
        require_same_escrow(&id, blockchain_identifier)?;
        let status = self.status();
        if !status.is_some_and(PaymentStatus::refund_outstanding) {
            return Err(Error::invalid_state(OP, status_label(status)));
        }

        let body = EscrowActionBody {
            network: self.network,
            blockchain_identifier: id.clone(),
        };
        self.service.authorize_refund(&body).await?;

        self.state.write().status = Some(PaymentStatus::RefundAuthorized);
        info!("Payment {id}: refund authorized");
        Ok(())
    }

    /// Poll the escrow every `interval`, updating this payment's status.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] before creation.
    pub fn start_status_monitoring(&self, interval: Duration) -> Result<StatusMonitor<PaymentStatus>> {
        let id = self.require_created("start status monitoring")?;
        let service = Arc::clone(&self.service);
        let state = Arc::clone(&self.state);
        let network = self.network;
        let schedule = self.schedule;
        debug!("Monitoring payment {id} every {interval:?}");

        Ok(StatusMonitor::spawn(
            move || {
                let service = Arc::clone(&service);
                let state = Arc::clone(&state);
                let id = id.clone();
                async move { refresh(service.as_ref(), network, &id, &schedule, &state).await }
            },
            interval,
        ))
    }

    /// Identifier assigned by the service, once created.
    #[must_use]
    pub fn blockchain_identifier(&self) -> Option<String> {
        self.state.read().blockchain_identifier.clone()
    }

    /// Last known status; `None` before creation.
    #[must_use]
    pub fn status(&self) -> Option<PaymentStatus> {
        self.state.read().status
    }

    /// Escrow deadlines.
    #[must_use]
    pub fn schedule(&self) -> &DeadlineSchedule {
        &self.schedule
    }

    /// Input hash registered with the escrow.
    #[must_use]
    pub fn input_hash(&self) -> Option<IntegrityHash> {
        self.state.read().input_hash
    }

    /// Submitted output hash, if any.
    #[must_use]
    pub fn result_hash(&self) -> Option<IntegrityHash> {
        self.state.read().result_hash
    }

    /// Ledger environment.
    #[must_use]
    pub fn network(&self) -> Network {
        self.network
    }

    /// Request this payment was built from; `None` when resumed.
    #[must_use]
    pub fn request(&self) -> Option<&PaymentRequest> {
        self.request.as_ref()
    }

    fn require_created(&self, operation: &'static str) -> Result<String> {
        self.blockchain_identifier()
            .ok_or_else(|| Error::invalid_state(operation, status_label(None)))
    }
}

impl std::fmt::Debug for Payment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payment")
            .field("network", &self.network)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

async fn refresh(
    service: &dyn PaymentService,
    network: Network,
    blockchain_identifier: &str,
    schedule: &DeadlineSchedule,
    state: &RwLock<PaymentState>,
) -> Result<PaymentStatus> {
    let record = service.payment_record(network, blockchain_identifier).await?;
    if record.blockchain_identifier != blockchain_identifier {
        return Err(ServiceError::MalformedResponse(format!(
            "asked for {blockchain_identifier}, got {}",
            record.blockchain_identifier
        ))
        .into());
    }
    let status = PaymentStatus::derive(&record, schedule, Utc::now());

    let mut state = state.write();
    if state.status != Some(status) {
        info!("Payment {blockchain_identifier}: {} -> {status}", status_label(state.status));
    }
    state.status = Some(status);
    if record.result_hash.is_some() {
        state.result_hash = record.result_hash;
    }
    Ok(status)
}

fn require_same_escrow(own: &str, given: &str) -> Result<()> {
    if own == given {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "blockchainIdentifier {given} does not belong to payment {own}"
        )))
    }
}

fn status_label(status: Option<PaymentStatus>) -> String {
    status.map_or_else(|| "not created".to_string(), |s| s.to_string())
}
