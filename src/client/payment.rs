//! reqwest-backed [`PaymentService`].

use crate::client::api::ApiClient;
use crate::client::wire::{
    CreatePaymentBody, CreatePurchaseBody, EscrowActionBody, EscrowRecord, PaymentPage,
    PurchasePage, RecordPage, SubmitResultBody,
};
use crate::client::PaymentService;
use crate::config::{ClientConfig, Network};
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;
use tracing::debug;

/// Payment service client speaking the REST API.
#[derive(Debug, Clone)]
pub struct HttpPaymentService {
    api: ApiClient,
    page_size: u32,
    max_pages: u32,
}

impl HttpPaymentService {
    /// Build a client from the payment section of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(config.payment.clone(), config.request_timeout(), config.retry)?,
            page_size: config.monitor.page_size.max(1),
            max_pages: config.monitor.max_pages.max(1),
        })
    }

    /// Underlying transport.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Walk a paginated list endpoint until `blockchain_identifier` shows up.
    async fn scan<P: RecordPage + DeserializeOwned>(
        &self,
        path: &str,
        network: Network,
        blockchain_identifier: &str,
    ) -> Result<EscrowRecord> {
        let limit = self.page_size.to_string();
        let pages = PageScan {
            what: path,
            page_size: self.page_size,
            max_pages: self.max_pages,
        };
        pages
            .find(blockchain_identifier, |cursor| {
                let mut query = vec![
                    ("network", network.as_str().to_string()),
                    ("limit", limit.clone()),
                ];
                if let Some(c) = cursor {
                    query.push(("cursorId", c));
                }
                async move { self.api.get::<P>(path, &query).await.map(P::into_records) }
            })
            .await
    }
}

/// Cursor pagination over a list endpoint, newest first.
///
/// Each page after the first is requested with the `id` of the last record
/// seen. The scan stops on a short page, a cursor that does not advance, or
/// after `max_pages` pages.
#[derive(Debug, Clone, Copy)]
struct PageScan<'a> {
    what: &'a str,
    page_size: u32,
    max_pages: u32,
}

impl PageScan<'_> {
    async fn find<F, Fut>(&self, blockchain_identifier: &str, mut fetch: F) -> Result<EscrowRecord>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Vec<EscrowRecord>>>,
    {
        let mut cursor: Option<String> = None;
        for page_no in 0..self.max_pages {
            let records = fetch(cursor.clone()).await?;
            debug!("Scanned page {page_no} of {}: {} records", self.what, records.len());

            let full_page = records.len() >= self.page_size as usize;
            let next_cursor = records.last().and_then(|r| r.id.clone());
            if let Some(found) = records
                .into_iter()
                .find(|r| r.blockchain_identifier == blockchain_identifier)
            {
                return Ok(found);
            }
            match next_cursor {
                Some(next) if full_page && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }
        Err(ServiceError::NotFound(format!("{} {blockchain_identifier}", self.what)).into())
    }
}

#[async_trait]
impl PaymentService for HttpPaymentService {
    async fn create_payment(&self, body: &CreatePaymentBody) -> Result<EscrowRecord> {
        self.api.post("payment/", body).await
    }

    async fn payment_record(&self, network: Network, blockchain_identifier: &str) -> Result<EscrowRecord> {
        self.scan::<PaymentPage>("payment/", network, blockchain_identifier)
            .await
    }

    async fn submit_result(&self, body: &SubmitResultBody) -> Result<EscrowRecord> {
        self.api.post("payment/submit-result", body).await
    }

    async fn authorize_refund(&self, body: &EscrowActionBody) -> Result<EscrowRecord> {
        self.api.post("payment/authorize-refund", body).await
    }

    async fn create_purchase(&self, body: &CreatePurchaseBody) -> Result<EscrowRecord> {
        self.api.post("purchase/", body).await
    }

    async fn purchase_record(&self, network: Network, blockchain_identifier: &str) -> Result<EscrowRecord> {
        self.scan::<PurchasePage>("purchase/", network, blockchain_identifier)
            .await
    }

    async fn request_refund(&self, body: &EscrowActionBody) -> Result<EscrowRecord> {
        self.api.post("purchase/request-refund", body).await
    }

    async fn cancel_refund_request(&self, body: &EscrowActionBody) -> Result<EscrowRecord> {
        self.api.post("purchase/cancel-refund-request", body).await
    }
}
