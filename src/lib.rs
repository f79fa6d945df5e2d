//! # masumi-client
//!
//! Client side of a time-boxed escrow handshake between a service seller and
//! a buyer, mediated by a ledger-backed payment service.
//!
//! ## Overview
//!
//! - [`Payment`]: the seller registers a payment request, waits for the
//!   buyer's funds, submits the output hash and authorizes refunds.
//! - [`Purchase`]: the buyer locks funds against the seller's request,
//!   watches for the result and can request (or withdraw) a refund.
//! - [`StatusMonitor`]: cancellable polling that reports status changes as
//!   a stream or to an observer.
//! - [`integrity`]: canonical JSON and the SHA-256 input and output hashes
//!   that bind off-chain data to the escrow.
//!
//! The remote service is reached through the [`PaymentService`] and
//! [`RegistryService`] traits; [`HttpPaymentService`] and
//! [`HttpRegistryClient`] are the HTTP implementations.
//!
//! ## Escrow timeline
//!
//! ```text
//!   create ──► funds locked ──► result submitted ──► unlock ──► withdrawn
//!      │            │                                   │
//!   pay_by     submit_result                    external_dispute_unlock
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod identifier;
pub mod integrity;
pub mod monitor;
pub mod payment;
pub mod purchase;
pub mod schedule;

pub use client::wire::Amount;
pub use client::{HttpPaymentService, HttpRegistryClient, PaymentService, RegistryService};
pub use config::{ClientConfig, Network, ServiceEndpoint};
pub use error::{Error, Result, ServiceError};
pub use identifier::PurchaserId;
pub use integrity::{canonical_json, hash_input, hash_output, IntegrityHash};
pub use monitor::{LifecycleStatus, MonitorEvent, ObserverHandle, StatusMonitor};
pub use payment::{Payment, PaymentRequest, PaymentStatus};
pub use purchase::{Purchase, PurchaseRequest, PurchaseStatus};
pub use schedule::DeadlineSchedule;
