//! Buyer-side request parameters.

use crate::client::wire::Amount;
use crate::config::Network;
use crate::schedule::DeadlineSchedule;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A purchase against a seller's payment request.
///
/// The identifier, seller key and deadlines come from the seller's created
/// payment request; the buyer never generates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    /// Identifier of the seller's payment request.
    pub blockchain_identifier: String,
    /// Seller wallet verification key (hex).
    pub seller_vkey: String,
    /// Registered seller agent.
    pub agent_identifier: String,
    /// Purchase scope (26 hex characters), as given to the seller.
    pub identifier_from_purchaser: String,
    /// Ledger environment.
    #[serde(default)]
    pub network: Network,
    /// Deadlines mirrored from the seller's request.
    pub schedule: DeadlineSchedule,
    /// Job input; must hash to the seller's input hash.
    pub input_data: Value,
    /// Amounts to lock; should match the seller's price.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amounts: Vec<Amount>,
    /// Free-form metadata stored with the purchase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl PurchaseRequest {
    /// Create a purchase request on the default network.
    #[must_use]
    pub fn new(
        blockchain_identifier: impl Into<String>,
        seller_vkey: impl Into<String>,
        agent_identifier: impl Into<String>,
        identifier_from_purchaser: impl Into<String>,
        schedule: DeadlineSchedule,
        input_data: Value,
    ) -> Self {
        Self {
            blockchain_identifier: blockchain_identifier.into(),
            seller_vkey: seller_vkey.into(),
            agent_identifier: agent_identifier.into(),
            identifier_from_purchaser: identifier_from_purchaser.into(),
            network: Network::default(),
            schedule,
            input_data,
            amounts: Vec::new(),
            metadata: None,
        }
    }

    /// Target a different network.
    #[must_use]
    pub fn on_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Add one priced component.
    #[must_use]
    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amounts.push(amount);
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}
