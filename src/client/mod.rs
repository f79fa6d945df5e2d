//! Remote service clients.
//!
//! The lifecycle types never talk HTTP directly. They hold an
//! `Arc<dyn PaymentService>`, so tests and embedders can swap in their own
//! ledger. [`HttpPaymentService`] and [`HttpRegistryClient`] are the
//! reqwest-backed implementations.
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | create payment | `POST payment/` |
//! | payment status | `GET payment/` (paged scan) |
//! | submit result | `POST payment/submit-result` |
//! | authorize refund | `POST payment/authorize-refund` |
//! | create purchase | `POST purchase/` |
//! | purchase status | `GET purchase/` (paged scan) |
//! | request refund | `POST purchase/request-refund` |
//! | cancel refund | `POST purchase/cancel-refund-request` |
//! | register agent | `POST registry/` |
//! | registration status | `GET registry/` |
//! | selling wallet | `GET payment-source/` |

pub mod api;
#[cfg(test)]
pub(crate) mod fake;
pub mod payment;
pub mod registry;
pub mod wire;

pub use api::ApiClient;
pub use payment::HttpPaymentService;
pub use registry::HttpRegistryClient;

use crate::config::Network;
use crate::error::Result;
use async_trait::async_trait;
use wire::{
    AgentRegistration, CreatePaymentBody, CreatePurchaseBody, EscrowActionBody, EscrowRecord,
    RegistryEntry, SubmitResultBody,
};

/// Escrow operations offered by the payment service.
///
/// Every method returns the escrow record as the service reports it after
/// the call.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Register a new payment request (seller).
    async fn create_payment(&self, body: &CreatePaymentBody) -> Result<EscrowRecord>;

    /// Fetch the current payment record (seller).
    ///
    /// The HTTP implementation scans list pages newest first and gives up
    /// after `monitor.max_pages` pages with
    /// [`ServiceError::NotFound`](crate::error::ServiceError::NotFound).
    async fn payment_record(&self, network: Network, blockchain_identifier: &str) -> Result<EscrowRecord>;

    /// Submit the output hash (seller).
    async fn submit_result(&self, body: &SubmitResultBody) -> Result<EscrowRecord>;

    /// Approve an outstanding refund request (seller).
    async fn authorize_refund(&self, body: &EscrowActionBody) -> Result<EscrowRecord>;

    /// Create a purchase against a payment request and lock funds (buyer).
    async fn create_purchase(&self, body: &CreatePurchaseBody) -> Result<EscrowRecord>;

    /// Fetch the current purchase record (buyer). Same lookup limit as
    /// [`payment_record`](Self::payment_record).
    async fn purchase_record(&self, network: Network, blockchain_identifier: &str) -> Result<EscrowRecord>;

    /// Ask for a refund (buyer).
    async fn request_refund(&self, body: &EscrowActionBody) -> Result<EscrowRecord>;

    /// Withdraw a refund request (buyer).
    async fn cancel_refund_request(&self, body: &EscrowActionBody) -> Result<EscrowRecord>;
}

/// Agent registry operations.
#[async_trait]
pub trait RegistryService: Send + Sync {
    /// Register an agent.
    async fn register_agent(&self, registration: &AgentRegistration) -> Result<RegistryEntry>;

    /// List agents registered by `wallet_vkey`.
    async fn registration_status(&self, network: Network, wallet_vkey: &str) -> Result<Vec<RegistryEntry>>;

    /// First selling wallet configured for `network`.
    async fn selling_wallet_vkey(&self, network: Network) -> Result<String>;
}
