//! Authenticated JSON transport shared by the service clients.

use crate::client::wire::Envelope;
use crate::config::{RetryPolicy, ServiceEndpoint};
use crate::error::{Error, Result, ServiceError};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the service API key.
const TOKEN_HEADER: &str = "token";

/// JSON-over-HTTP client for one service endpoint.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    endpoint: ServiceEndpoint,
    retry: RetryPolicy,
}

impl ApiClient {
    /// Build a client for `endpoint` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the TLS backend cannot be initialized.
    pub fn new(endpoint: ServiceEndpoint, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("masumi-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            retry,
        })
    }

    /// Endpoint this client talks to.
    #[must_use]
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// GET `path` and decode the envelope payload.
    ///
    /// Retried on transient failures according to the retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Service`] on transport failure, rejection or an
    /// undecodable body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.endpoint.url(path);
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            debug!("GET {url} (attempt {attempt}/{attempts})");
            let request = self.authorized(self.http.get(&url)).query(query);
            match Self::send(request).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!("GET {url} failed, retrying: {e}");
                    tokio::time::sleep(self.retry.backoff()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// POST `body` to `path` and decode the envelope payload. Never retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Service`] on transport failure, rejection or an
    /// undecodable body.
    pub async fn post<T: DeserializeOwned, B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.endpoint.url(path);
        debug!("POST {url}");
        let request = self.authorized(self.http.post(&url)).json(body);
        Ok(Self::send(request).await?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(TOKEN_HEADER, &self.endpoint.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> std::result::Result<T, ServiceError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        decode(status, &body)
    }
}

/// Turn an HTTP status and body into the envelope payload or a typed error.
pub(crate) fn decode<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
) -> std::result::Result<T, ServiceError> {
    if !status.is_success() {
        return Err(classify(status, body));
    }
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| ServiceError::MalformedResponse(format!("{e}: {}", truncate(body))))?;
    if envelope.status != "success" {
        return Err(ServiceError::Rejected {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }
    Ok(envelope.data)
}

/// Map a non-success status to a service error.
pub(crate) fn classify(status: StatusCode, body: &str) -> ServiceError {
    match status {
        StatusCode::NOT_FOUND => ServiceError::NotFound(truncate(body).to_string()),
        _ => ServiceError::Rejected {
            status: status.as_u16(),
            body: body.to_string(),
        },
    }
}

fn truncate(body: &str) -> &str {
    const MAX: usize = 256;
    if body.len() <= MAX {
        return body;
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
