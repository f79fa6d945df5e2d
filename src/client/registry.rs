//! reqwest-backed [`RegistryService`].

use crate::client::api::ApiClient;
use crate::client::wire::{AgentRegistration, PaymentSourcePage, RegistryEntry, RegistryPage};
use crate::client::RegistryService;
use crate::config::{ClientConfig, Network};
use crate::error::{Error, Result, ServiceError};
use async_trait::async_trait;
use tracing::info;

/// Registry client.
///
/// Registration goes to the registry endpoint; the selling wallet lookup
/// goes to the payment endpoint, which owns the wallets.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    registry: ApiClient,
    payment: ApiClient,
}

impl HttpRegistryClient {
    /// Build a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no registry endpoint is configured.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let endpoint = config
            .registry
            .clone()
            .ok_or_else(|| Error::Config("registry endpoint is not configured".into()))?;
        Ok(Self {
            registry: ApiClient::new(endpoint, config.request_timeout(), config.retry)?,
            payment: ApiClient::new(config.payment.clone(), config.request_timeout(), config.retry)?,
        })
    }
}

#[async_trait]
impl RegistryService for HttpRegistryClient {
    async fn register_agent(&self, registration: &AgentRegistration) -> Result<RegistryEntry> {
        info!("Registering agent {} on {}", registration.name, registration.network);
        self.registry.post("registry/", registration).await
    }

    async fn registration_status(
        &self,
        network: Network,
        wallet_vkey: &str,
    ) -> Result<Vec<RegistryEntry>> {
        let query = [
            ("network", network.as_str().to_string()),
            ("walletVKey", wallet_vkey.to_string()),
        ];
        let page: RegistryPage = self.registry.get("registry/", &query).await?;
        Ok(page.assets)
    }

    async fn selling_wallet_vkey(&self, network: Network) -> Result<String> {
        let page: PaymentSourcePage = self.payment.get("payment-source/", &[]).await?;
        page.selling_wallet_vkey(network)
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("no selling wallet configured for {network}")).into()
            })
    }
}
