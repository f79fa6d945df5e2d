//! Typed request and response records exchanged with the payment and
//! registry services.
//!
//! Every operation has its own request body with compile-time required
//! fields. Responses are decoded into [`EscrowRecord`] at the boundary; a
//! record with an unknown on-chain state fails to decode instead of leaking
//! an untyped value into the lifecycle code.

use crate::config::Network;
use crate::error::{Error, Result, ServiceError};
use crate::integrity::IntegrityHash;
use crate::schedule::{unix_millis, DeadlineSchedule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Response envelope used by both services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// `"success"` on success.
    pub status: String,
    /// Operation payload.
    pub data: T,
}

/// Escrow contract flavour. Only one exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentType {
    /// Cardano escrow contract, version 1.
    #[default]
    Web3CardanoV1,
}

/// Asset unit used when an amount names none.
pub const DEFAULT_UNIT: &str = "lovelace";

/// One priced component of an escrow: a quantity of a single asset.
///
/// Parses from `AMOUNT` or `AMOUNT:UNIT`, e.g. `10000000` or
/// `5:usdm`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    /// Quantity in the smallest unit, as a decimal string.
    pub amount: String,
    /// Asset unit, e.g. `lovelace`.
    pub unit: String,
}

impl Amount {
    /// Build an amount.
    #[must_use]
    pub fn new(amount: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            unit: unit.into(),
        }
    }

    /// Amount in lovelace.
    #[must_use]
    pub fn lovelace(amount: u64) -> Self {
        Self::new(amount.to_string(), DEFAULT_UNIT)
    }

    /// Check the quantity is a positive decimal integer and the unit is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] otherwise.
    pub fn validate(&self) -> Result<()> {
        let digits = !self.amount.is_empty() && self.amount.bytes().all(|b| b.is_ascii_digit());
        if !digits || self.amount.bytes().all(|b| b == b'0') {
            return Err(Error::Validation(format!(
                "amount must be a positive integer, got {:?}",
                self.amount
            )));
        }
        if self.unit.trim().is_empty() {
            return Err(Error::Validation("amount unit must not be empty".into()));
        }
        Ok(())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.amount, self.unit)
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (amount, unit) = s.split_once(':').unwrap_or((s, DEFAULT_UNIT));
        let parsed = Self::new(amount.trim(), unit.trim());
        parsed.validate()?;
        Ok(parsed)
    }
}

/// Body of `POST payment/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentBody {
    /// Registered seller agent.
    pub agent_identifier: String,
    /// Ledger environment.
    pub network: Network,
    /// Salted digest of the job input.
    pub input_hash: IntegrityHash,
    /// Buyer-chosen purchase scope.
    pub identifier_from_purchaser: String,
    /// Escrow contract flavour.
    pub payment_type: PaymentType,
    /// Price of the job; empty lets the service use the agent's pricing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amounts: Vec<Amount>,
    /// The four deadlines.
    #[serde(flatten)]
    pub schedule: DeadlineSchedule,
    /// Free-form metadata stored with the escrow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// Body of `POST purchase/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseBody {
    /// Identifier of the seller's payment request.
    pub blockchain_identifier: String,
    /// Seller wallet verification key.
    pub seller_vkey: String,
    /// Registered seller agent.
    pub agent_identifier: String,
    /// Buyer-chosen purchase scope.
    pub identifier_from_purchaser: String,
    /// Ledger environment.
    pub network: Network,
    /// Salted digest of the job input.
    pub input_hash: IntegrityHash,
    /// Escrow contract flavour.
    pub payment_type: PaymentType,
    /// Amounts the buyer agrees to lock.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amounts: Vec<Amount>,
    /// Deadlines copied from the seller's request.
    #[serde(flatten)]
    pub schedule: DeadlineSchedule,
    /// Free-form metadata stored with the purchase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// Body of `POST payment/submit-result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResultBody {
    /// Ledger environment.
    pub network: Network,
    /// Escrow being completed.
    pub blockchain_identifier: String,
    /// Digest of the job output.
    pub submit_result_hash: IntegrityHash,
}

/// Body of the single-escrow actions: authorize refund, request refund and
/// cancel refund request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowActionBody {
    /// Ledger environment.
    pub network: Network,
    /// Escrow the action applies to.
    pub blockchain_identifier: String,
}

/// Confirmed state of the escrow on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OnChainState {
    /// Buyer funds are locked in the contract.
    FundsLocked,
    /// The contract datum or locked funds do not match the request.
    FundsOrDatumInvalid,
    /// Seller submitted the result hash.
    ResultSubmitted,
    /// Buyer requested a refund.
    RefundRequested,
    /// Refund request met a submitted result.
    Disputed,
    /// Seller withdrew the funds.
    Withdrawn,
    /// Buyer withdrew the refund.
    RefundWithdrawn,
    /// Dispute settled and funds withdrawn.
    DisputedWithdrawn,
}

/// Action the service is about to perform (or waits on) for this escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RequestedAction {
    /// Nothing pending.
    #[default]
    #[serde(rename = "None")]
    Idle,
    /// Record ignored by the service.
    Ignore,
    /// Service needs an operator.
    WaitingForManualAction,
    /// Waiting on the counterparty or the ledger.
    WaitingForExternalAction,
    /// Buyer funds lock queued.
    FundsLockingRequested,
    /// Buyer funds lock transaction submitted.
    FundsLockingInitiated,
    /// Refund request queued.
    SetRefundRequestedRequested,
    /// Refund request transaction submitted.
    SetRefundRequestedInitiated,
    /// Refund cancellation queued.
    UnSetRefundRequestedRequested,
    /// Refund cancellation transaction submitted.
    UnSetRefundRequestedInitiated,
    /// Refund withdrawal queued.
    WithdrawRefundRequested,
    /// Refund withdrawal transaction submitted.
    WithdrawRefundInitiated,
    /// Result submission queued.
    SubmitResultRequested,
    /// Result submission transaction submitted.
    SubmitResultInitiated,
    /// Refund authorization queued.
    AuthorizeRefundRequested,
    /// Refund authorization transaction submitted.
    AuthorizeRefundInitiated,
    /// Seller withdrawal queued.
    WithdrawRequested,
    /// Seller withdrawal transaction submitted.
    WithdrawInitiated,
    /// Any action this client does not know about.
    #[serde(other)]
    Other,
}

impl RequestedAction {
    /// Result submission queued or in progress.
    #[must_use]
    pub const fn is_submit_result(self) -> bool {
        matches!(self, Self::SubmitResultRequested | Self::SubmitResultInitiated)
    }

    /// Refund authorization queued or in progress.
    #[must_use]
    pub const fn is_authorize_refund(self) -> bool {
        matches!(self, Self::AuthorizeRefundRequested | Self::AuthorizeRefundInitiated)
    }

    /// Refund request queued or in progress.
    #[must_use]
    pub const fn is_set_refund_requested(self) -> bool {
        matches!(
            self,
            Self::SetRefundRequestedRequested | Self::SetRefundRequestedInitiated
        )
    }

    /// Refund cancellation queued or in progress.
    #[must_use]
    pub const fn is_unset_refund_requested(self) -> bool {
        matches!(
            self,
            Self::UnSetRefundRequestedRequested | Self::UnSetRefundRequestedInitiated
        )
    }
}

/// `NextAction` object of an escrow record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextAction {
    /// Pending action.
    #[serde(default)]
    pub requested_action: RequestedAction,
    /// Error class of the last failed action, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Human-readable note for the last failed action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_note: Option<String>,
}

/// One escrow as reported by the payment service.
///
/// The same shape is used for payments and purchases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowRecord {
    /// Service-internal row id, used as the pagination cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Escrow correlation key.
    pub blockchain_identifier: String,
    /// Confirmed ledger state; `null` before funds are locked.
    #[serde(default)]
    pub on_chain_state: Option<OnChainState>,
    /// Pending service action.
    #[serde(rename = "NextAction", default)]
    pub next_action: NextAction,
    /// Registered seller agent, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_identifier: Option<String>,
    /// Purchase scope, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_from_purchaser: Option<String>,
    /// Pay-by deadline.
    #[serde(default, with = "unix_millis::option", skip_serializing_if = "Option::is_none")]
    pub pay_by_time: Option<DateTime<Utc>>,
    /// Result submission deadline.
    #[serde(default, with = "unix_millis::option", skip_serializing_if = "Option::is_none")]
    pub submit_result_time: Option<DateTime<Utc>>,
    /// Unlock time.
    #[serde(default, with = "unix_millis::option", skip_serializing_if = "Option::is_none")]
    pub unlock_time: Option<DateTime<Utc>>,
    /// External dispute unlock time.
    #[serde(default, with = "unix_millis::option", skip_serializing_if = "Option::is_none")]
    pub external_dispute_unlock_time: Option<DateTime<Utc>>,
    /// Salted digest of the job input.
    #[serde(default, deserialize_with = "hash_or_empty", skip_serializing_if = "Option::is_none")]
    pub input_hash: Option<IntegrityHash>,
    /// Digest of the job output, once submitted.
    #[serde(default, deserialize_with = "hash_or_empty", skip_serializing_if = "Option::is_none")]
    pub result_hash: Option<IntegrityHash>,
}

impl EscrowRecord {
    /// A fresh record with only its identifier set.
    #[must_use]
    pub fn new(blockchain_identifier: impl Into<String>) -> Self {
        Self {
            id: None,
            blockchain_identifier: blockchain_identifier.into(),
            on_chain_state: None,
            next_action: NextAction::default(),
            agent_identifier: None,
            identifier_from_purchaser: None,
            pay_by_time: None,
            submit_result_time: None,
            unlock_time: None,
            external_dispute_unlock_time: None,
            input_hash: None,
            result_hash: None,
        }
    }

    /// Pending action shortcut.
    #[must_use]
    pub fn requested_action(&self) -> RequestedAction {
        self.next_action.requested_action
    }

    /// Rebuild the deadline schedule reported with the record.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::MalformedResponse`] if a deadline is missing
    /// or the deadlines are out of order.
    pub fn schedule(&self) -> Result<DeadlineSchedule> {
        let missing = |field: &str| {
            ServiceError::MalformedResponse(format!(
                "escrow {} has no {field}",
                self.blockchain_identifier
            ))
        };
        DeadlineSchedule::new(
            self.pay_by_time.ok_or_else(|| missing("payByTime"))?,
            self.submit_result_time.ok_or_else(|| missing("submitResultTime"))?,
            self.unlock_time.ok_or_else(|| missing("unlockTime"))?,
            self.external_dispute_unlock_time
                .ok_or_else(|| missing("externalDisputeUnlockTime"))?,
        )
        .map_err(|e| ServiceError::MalformedResponse(e.to_string()).into())
    }

    /// Copy the deadlines of `schedule` onto the record.
    #[must_use]
    pub fn with_schedule(mut self, schedule: &DeadlineSchedule) -> Self {
        self.pay_by_time = Some(schedule.pay_by_time());
        self.submit_result_time = Some(schedule.submit_result_time());
        self.unlock_time = Some(schedule.unlock_time());
        self.external_dispute_unlock_time = Some(schedule.external_dispute_unlock_time());
        self
    }
}

fn hash_or_empty<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<IntegrityHash>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// One page of `GET payment/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentPage {
    /// Payments on this page.
    #[serde(rename = "Payments", default)]
    pub payments: Vec<EscrowRecord>,
}

/// One page of `GET purchase/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurchasePage {
    /// Purchases on this page.
    #[serde(rename = "Purchases", default)]
    pub purchases: Vec<EscrowRecord>,
}

/// A list response that can be scanned for one escrow.
pub trait RecordPage {
    /// Consume the page into its records.
    fn into_records(self) -> Vec<EscrowRecord>;
}

impl RecordPage for PaymentPage {
    fn into_records(self) -> Vec<EscrowRecord> {
        self.payments
    }
}

impl RecordPage for PurchasePage {
    fn into_records(self) -> Vec<EscrowRecord> {
        self.purchases
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Example output advertised by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleOutput {
    /// Display name.
    pub name: String,
    /// Where the example can be fetched.
    pub url: String,
    /// MIME type of the example.
    pub mime_type: String,
}

/// Capability advertised by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Capability name.
    pub name: String,
    /// Capability version.
    pub version: String,
}

/// Agent author details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// Author name.
    pub name: String,
    /// Contact address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// Organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

/// Legal links of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Legal {
    /// Privacy policy URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_policy: Option<String>,
    /// Terms of use URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms: Option<String>,
    /// Other legal URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<String>,
}

/// Price of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Asset unit, e.g. `lovelace`.
    pub unit: String,
    /// Quantity in that unit, as a decimal string.
    pub quantity: String,
}

/// Body of `POST registry/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistration {
    /// Ledger environment.
    pub network: Network,
    /// Agent name.
    pub name: String,
    /// Agent description.
    pub description: String,
    /// Base URL of the agent API.
    pub api_base_url: String,
    /// Wallet that receives payments.
    pub selling_wallet_vkey: String,
    /// Search tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Example outputs.
    #[serde(default)]
    pub example_outputs: Vec<ExampleOutput>,
    /// Advertised capability.
    pub capability: Capability,
    /// Author details.
    pub author: Author,
    /// Legal links.
    #[serde(default)]
    pub legal: Legal,
    /// Price list.
    pub pricing: Vec<Price>,
    /// Rate limit advertised to buyers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_hour: Option<String>,
}

/// Registration lifecycle of an agent in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegistrationState {
    /// Registration queued.
    #[default]
    RegistrationRequested,
    /// Registration transaction submitted.
    RegistrationInitiated,
    /// Registration confirmed on the ledger.
    RegistrationConfirmed,
    /// Registration failed.
    RegistrationFailed,
    /// Deregistration queued.
    DeregistrationRequested,
    /// Deregistration transaction submitted.
    DeregistrationInitiated,
    /// Deregistration confirmed.
    DeregistrationConfirmed,
    /// Deregistration failed.
    DeregistrationFailed,
    /// Any state this client does not know about.
    #[serde(other)]
    Other,
}

/// One agent entry in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    /// Agent name.
    pub name: String,
    /// Registration state.
    #[serde(default)]
    pub state: RegistrationState,
    /// Assigned agent identifier, once minted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_identifier: Option<String>,
}

/// Body of `GET registry/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryPage {
    /// Registered agents for the queried wallet.
    #[serde(rename = "Assets", default)]
    pub assets: Vec<RegistryEntry>,
}

/// One selling wallet of a payment source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellingWallet {
    /// Wallet verification key.
    pub wallet_vkey: String,
}

/// A payment source configured in the payment service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSource {
    /// Ledger environment of the source.
    pub network: Network,
    /// Wallets that receive payments.
    #[serde(rename = "SellingWallets", default)]
    pub selling_wallets: Vec<SellingWallet>,
}

/// Body of `GET payment-source/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentSourcePage {
    /// Configured payment sources.
    #[serde(rename = "PaymentSources", default)]
    pub sources: Vec<PaymentSource>,
}

impl PaymentSourcePage {
    /// First selling wallet configured for `network`.
    #[must_use]
    pub fn selling_wallet_vkey(&self, network: Network) -> Option<&str> {
        self.sources
            .iter()
            .filter(|s| s.network == network)
            .flat_map(|s| s.selling_wallets.iter())
            .map(|w| w.wallet_vkey.as_str())
            .next()
    }
}
