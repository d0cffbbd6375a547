//! Scriptable in-memory chain client.
//!
//! Broadcasts succeed with a fresh `mock-tx-N` hash unless a scripted result
//! is queued. Status queries answer from a per-hash table, falling back to
//! `Confirmed`. Every call is recorded for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use corgi_types::TokenAmount;

use crate::chain::{ChainClient, ChainError, ChainTxStatus, TxReceipt};

/// A recorded `send_transaction` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransfer {
    pub to: String,
    pub amount: TokenAmount,
    pub memo: Option<String>,
}

#[derive(Debug)]
struct Inner {
    send_script: VecDeque<Result<TxReceipt, ChainError>>,
    status_script: VecDeque<Result<ChainTxStatus, ChainError>>,
    statuses: HashMap<String, ChainTxStatus>,
    default_status: ChainTxStatus,
    send_delay: Option<Duration>,
    sent: Vec<SentTransfer>,
    status_queries: Vec<String>,
    next_hash: u64,
}

#[derive(Debug)]
pub struct MockChainClient {
    inner: Mutex<Inner>,
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChainClient {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                send_script: VecDeque::new(),
                status_script: VecDeque::new(),
                statuses: HashMap::new(),
                default_status: ChainTxStatus::Confirmed,
                send_delay: None,
                sent: Vec::new(),
                status_queries: Vec::new(),
                next_hash: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the result of the next broadcast.
    pub fn push_send_result(&self, result: Result<TxReceipt, ChainError>) {
        self.lock().send_script.push_back(result);
    }

    /// Queue `n` consecutive broadcast failures.
    pub fn fail_sends(&self, n: usize, err: ChainError) {
        let mut inner = self.lock();
        for _ in 0..n {
            inner.send_script.push_back(Err(err.clone()));
        }
    }

    /// Queue the result of the next status query, ahead of the per-hash table.
    pub fn push_status_result(&self, result: Result<ChainTxStatus, ChainError>) {
        self.lock().status_script.push_back(result);
    }

    pub fn set_status(&self, hash: &str, status: ChainTxStatus) {
        self.lock().statuses.insert(hash.to_string(), status);
    }

    /// Sleep this long inside every broadcast.
    pub fn set_send_delay(&self, delay: Duration) {
        self.lock().send_delay = Some(delay);
    }

    pub fn sent(&self) -> Vec<SentTransfer> {
        self.lock().sent.clone()
    }

    pub fn send_count(&self) -> usize {
        self.lock().sent.len()
    }

    pub fn status_queries(&self) -> Vec<String> {
        self.lock().status_queries.clone()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn send_transaction(
        &self,
        to: &str,
        amount: TokenAmount,
        memo: Option<&str>,
    ) -> Result<TxReceipt, ChainError> {
        let (result, delay) = {
            let mut inner = self.lock();
            inner.sent.push(SentTransfer {
                to: to.to_string(),
                amount,
                memo: memo.map(str::to_string),
            });
            let result = match inner.send_script.pop_front() {
                Some(scripted) => scripted,
                None => {
                    let hash = format!("mock-tx-{}", inner.next_hash);
                    inner.next_hash += 1;
                    Ok(TxReceipt { hash })
                }
            };
            (result, inner.send_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn get_transaction_status(&self, hash: &str) -> Result<ChainTxStatus, ChainError> {
        let mut inner = self.lock();
        inner.status_queries.push(hash.to_string());
        if let Some(scripted) = inner.status_script.pop_front() {
            return scripted;
        }
        Ok(inner
            .statuses
            .get(hash)
            .copied()
            .unwrap_or(inner.default_status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_send_generates_hashes() {
        let chain = MockChainClient::new();
        let amount = TokenAmount::from_base_units(5);
        let first = chain.send_transaction("EQa", amount, Some("m")).await.expect("send");
        let second = chain.send_transaction("EQb", amount, None).await.expect("send");
        assert_ne!(first.hash, second.hash);
        assert_eq!(chain.send_count(), 2);
        assert_eq!(chain.sent()[0].memo.as_deref(), Some("m"));
    }

    #[tokio::test]
    async fn test_scripted_failures_then_default() {
        let chain = MockChainClient::new();
        chain.fail_sends(1, ChainError::Timeout);
        let amount = TokenAmount::from_base_units(1);
        assert_eq!(
            chain.send_transaction("EQa", amount, None).await,
            Err(ChainError::Timeout)
        );
        assert!(chain.send_transaction("EQa", amount, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_table() {
        let chain = MockChainClient::new();
        chain.set_status("h1", ChainTxStatus::Failed);
        assert_eq!(
            chain.get_transaction_status("h1").await,
            Ok(ChainTxStatus::Failed)
        );
        assert_eq!(
            chain.get_transaction_status("other").await,
            Ok(ChainTxStatus::Confirmed)
        );
        assert_eq!(chain.status_queries().len(), 2);
    }
}
