//! Seller-side request parameters.

use crate::client::wire::Amount;
use crate::config::{DeadlineWindows, Network};
use crate::error::Result;
use crate::schedule::DeadlineSchedule;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the seller asks the payment service to register.
///
/// `identifier_from_purchaser` is kept as the raw string the buyer sent and
/// is validated when the request is submitted, so a malformed value is
/// reported as a validation error instead of being silently dropped here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Registered seller agent.
    pub agent_identifier: String,
    /// Buyer-chosen purchase scope (26 hex characters).
    pub identifier_from_purchaser: String,
    /// Ledger environment.
    #[serde(default)]
    pub network: Network,
    /// Job input, hashed into the escrow.
    pub input_data: Value,
    /// Escrow deadlines.
    pub schedule: DeadlineSchedule,
    /// Price of the job; empty defers to the agent's registered pricing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amounts: Vec<Amount>,
    /// Free-form metadata stored with the escrow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl PaymentRequest {
    /// Create a request on the default network.
    #[must_use]
    pub fn new(
        agent_identifier: impl Into<String>,
        identifier_from_purchaser: impl Into<String>,
        input_data: Value,
        schedule: DeadlineSchedule,
    ) -> Self {
        Self {
            agent_identifier: agent_identifier.into(),
            identifier_from_purchaser: identifier_from_purchaser.into(),
            network: Network::default(),
            input_data,
            schedule,
            amounts: Vec::new(),
            metadata: None,
        }
    }

    /// Create a request whose deadlines are `windows` from now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`](crate::Error::Validation) if the windows
    /// are out of order.
    pub fn with_windows(
        agent_identifier: impl Into<String>,
        identifier_from_purchaser: impl Into<String>,
        input_data: Value,
        windows: &DeadlineWindows,
    ) -> Result<Self> {
        let schedule = DeadlineSchedule::starting_at(Utc::now(), windows)?;
        Ok(Self::new(
            agent_identifier,
            identifier_from_purchaser,
            input_data,
            schedule,
        ))
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
