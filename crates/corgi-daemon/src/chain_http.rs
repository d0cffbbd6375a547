//! Chain client backed by the signer/relayer HTTP service.
//!
//! The relayer holds the bank wallet key and speaks the TON wire protocol;
//! the daemon only asks it to send transfers and to report their status.
//!
//! - `POST {endpoint}/transactions` with `{to, amount, memo}` returns `{hash}`
//! - `GET {endpoint}/transactions/{hash}` returns `{status}`

use std::time::Duration;

use async_trait::async_trait;
use corgi_settlement::{ChainClient, ChainError, ChainTxStatus, TxReceipt};
use corgi_types::TokenAmount;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    /// Base units, as a decimal string.
    amount: TokenAmount,
    #[serde(skip_serializing_if = "Option::is_none")]
    memo: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: ChainTxStatus,
}

pub struct HttpChainClient {
    client: Client,
    endpoint: String,
}

impl HttpChainClient {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create HTTP client: {e}"))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn check(response: Response) -> Result<Response, ChainError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unreadable response body".to_string());
        Err(classify_status(status.as_u16(), message))
    }
}

/// Map a non-success relayer response. 5xx is retryable, 4xx is not.
fn classify_status(status: u16, message: String) -> ChainError {
    match status {
        400 if message.contains("address") => ChainError::InvalidAddress(message),
        409 | 422 => ChainError::Rejected(message),
        _ => ChainError::Http { status, message },
    }
}

fn transport_error(err: reqwest::Error) -> ChainError {
    if err.is_timeout() {
        ChainError::Timeout
    } else if err.is_decode() {
        ChainError::Malformed(err.to_string())
    } else {
        ChainError::Network(err.to_string())
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn send_transaction(
        &self,
        to: &str,
        amount: TokenAmount,
        memo: Option<&str>,
    ) -> Result<TxReceipt, ChainError> {
        debug!(to, amount = %amount, "relayer send");
        let response = self
            .client
            .post(format!("{}/transactions", self.endpoint))
            .json(&SendRequest { to, amount, memo })
            .send()
            .await
            .map_err(transport_error)?;
        let body: SendResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;
        if body.hash.is_empty() {
            return Err(ChainError::Malformed("relayer returned an empty hash".into()));
        }
        Ok(TxReceipt { hash: body.hash })
    }

    async fn get_transaction_status(&self, hash: &str) -> Result<ChainTxStatus, ChainError> {
        let response = self
            .client
            .get(format!("{}/transactions/{hash}", self.endpoint))
            .send()
            .await
            .map_err(transport_error)?;
        let body: StatusResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;
        Ok(body.status)
    }
}
