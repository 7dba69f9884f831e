//! Ledger client
//!
//! A small typed vocabulary over the ledger's single JSON-RPC method
//! (`query`), with three parameter shapes: `{scope}` for accounts,
//! `{scope, query:{...}}` for sub-queries, and `{txid}` for transaction
//! retrieval. Transport failures are retried with backoff; RPC envelope
//! errors are swallowed per operation into "empty" results so callers
//! can treat a missing account like an absent one.

pub mod parse;
pub mod types;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::canonical::normalize_url;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::types::{Result, WatchtowerError};

pub use types::{KeyEntry, KeyPage, PendingTx, SignatureChainSlice, SignatureRecord, TxStatus, Vote};

/// RPC attempt/failure accounting for one user's discovery cycle.
///
/// When every attempt in a cycle failed the ledger is considered
/// unreachable and the inbox must be left untouched.
#[derive(Debug, Default)]
pub struct RpcTally {
    attempts: AtomicU64,
    failures: AtomicU64,
}

impl RpcTally {
    pub fn note<T>(&self, result: &Result<T>) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if result.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn all_failed(&self) -> bool {
        let attempts = self.attempts();
        attempts > 0 && self.failures() == attempts
    }
}

/// The query vocabulary the explorer and discovery engine consume.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Transaction ids pending against `scope`, first-seen order,
    /// deduplicated. Partial results are returned when pagination dies
    /// mid-flight after at least one page.
    async fn query_pending_tx_ids(&self, scope: &str) -> Result<Vec<String>>;

    /// Page count of a key book; 0 when `url` is not a key book.
    async fn query_key_book_page_count(&self, url: &str) -> Result<u64>;

    /// Typed key page, or None when `url` is not a key page.
    async fn query_key_page(&self, url: &str) -> Result<Option<KeyPage>>;

    /// A window of the account's signature chain.
    async fn query_signature_chain(
        &self,
        url: &str,
        start: u64,
        count: u64,
        expand: bool,
    ) -> Result<SignatureChainSlice>;

    /// Canonical URLs of the account's directory entries.
    async fn query_directory(&self, url: &str) -> Result<Vec<String>>;

    /// Full parsed transaction, or None when the id is unknown.
    async fn query_transaction(&self, tx_id: &str) -> Result<Option<PendingTx>>;

    /// Raw transaction response for callers that only need the status.
    async fn query_transaction_raw(&self, tx_id: &str) -> Result<Option<Value>>;

    /// Whether any account answers at `url`.
    async fn account_exists(&self, url: &str) -> Result<bool>;
}

/// Configuration for the JSON-RPC client.
#[derive(Debug, Clone)]
pub struct LedgerClientConfig {
    pub endpoint: String,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
    /// Page size for pending and directory ranges.
    pub page_size: u64,
    /// Hard cap on pages fetched per range query.
    pub max_pages: u64,
}

impl Default for LedgerClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://mainnet.accumulatenetwork.io/v3".to_string(),
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            page_size: 100,
            max_pages: 10,
        }
    }
}

/// reqwest-backed ledger client.
pub struct LedgerClient {
    http: reqwest::Client,
    config: LedgerClientConfig,
    next_id: AtomicU64,
}

impl LedgerClient {
    pub fn new(config: LedgerClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            config,
            next_id: AtomicU64::new(1),
        }
    }

    /// One `query` round trip: send, unwrap the JSON-RPC envelope, retry
    /// transient failures.
    async fn rpc(&self, op_name: &str, params: Value) -> Result<Value> {
        retry_with_backoff(&self.config.retry, op_name, || {
            let params = params.clone();
            async move {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let request = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "method": "query",
                    "params": params,
                });

                let response = self.http.post(&self.config.endpoint).json(&request).send().await?;

                let status = response.status();
                if !status.is_success() {
                    return Err(WatchtowerError::Http {
                        status: status.as_u16(),
                        message: format!("ledger endpoint returned {status}"),
                    });
                }

                let envelope: Value = response.json().await?;
                if let Some(error) = envelope.get("error") {
                    return Err(WatchtowerError::Rpc {
                        code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                        message: error
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown RPC error")
                            .to_string(),
                    });
                }

                Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
            }
        })
        .await
    }

    async fn query_scope(&self, op_name: &str, scope: &str) -> Result<Value> {
        self.rpc(op_name, json!({ "scope": scope })).await
    }
}

#[async_trait]
impl LedgerApi for LedgerClient {
    async fn query_pending_tx_ids(&self, scope: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut start = 0u64;

        for _ in 0..self.config.max_pages {
            let params = json!({
                "scope": scope,
                "query": {
                    "queryType": "pending",
                    "range": { "start": start, "count": self.config.page_size },
                },
            });

            let result = match self.rpc("query_pending", params).await {
                Ok(r) => r,
                Err(WatchtowerError::Rpc { code, message }) => {
                    debug!(scope, code, message, "pending query rejected, treating as empty");
                    return Ok(ids);
                }
                Err(e) if !ids.is_empty() => {
                    warn!(scope, error = %e, gathered = ids.len(), "pending pagination failed mid-flight, returning partial");
                    return Ok(ids);
                }
                Err(e) => return Err(e),
            };

            let (records, total) = parse::pending_records(&result);
            for record in &records {
                if let Some(id) = parse::record_tx_id(record) {
                    if seen.insert(id.clone()) {
                        ids.push(id);
                    }
                } else {
                    debug!(scope, record = %record, "could not extract tx id from pending record");
                }
            }

            let fetched = records.len() as u64;
            start += fetched;
            if fetched < self.config.page_size || fetched == 0 {
                break;
            }
            if let Some(total) = total {
                if start >= total {
                    break;
                }
            }
        }

        Ok(ids)
    }

    async fn query_key_book_page_count(&self, url: &str) -> Result<u64> {
        match self.query_scope("query_key_book", url).await {
            Ok(result) => Ok(parse::parse_page_count(&result)),
            Err(WatchtowerError::Rpc { code, message }) => {
                debug!(url, code, message, "key-book query rejected, treating as not a book");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    async fn query_key_page(&self, url: &str) -> Result<Option<KeyPage>> {
        match self.query_scope("query_key_page", url).await {
            Ok(result) => Ok(parse::parse_key_page(url, &result)),
            Err(WatchtowerError::Rpc { code, message }) => {
                debug!(url, code, message, "key-page query rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn query_signature_chain(
        &self,
        url: &str,
        start: u64,
        count: u64,
        expand: bool,
    ) -> Result<SignatureChainSlice> {
        let params = json!({
            "scope": url,
            "query": {
                "queryType": "chain",
                "name": "signature",
                "range": { "start": start, "count": count, "expand": expand },
            },
        });

        match self.rpc("query_signature_chain", params).await {
            Ok(result) => {
                let (records, total) = parse::range_records(&result);
                Ok(SignatureChainSlice {
                    total: total.unwrap_or(records.len() as u64),
                    records,
                })
            }
            Err(WatchtowerError::Rpc { code, message }) => {
                debug!(url, code, message, "signature-chain query rejected, treating as empty");
                Ok(SignatureChainSlice::default())
            }
            Err(e) => Err(e),
        }
    }

    async fn query_directory(&self, url: &str) -> Result<Vec<String>> {
        let mut urls = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut start = 0u64;

        for _ in 0..self.config.max_pages {
            let params = json!({
                "scope": url,
                "query": {
                    "queryType": "directory",
                    "range": { "start": start, "count": self.config.page_size },
                },
            });

            let result = match self.rpc("query_directory", params).await {
                Ok(r) => r,
                Err(WatchtowerError::Rpc { code, message }) => {
                    debug!(url, code, message, "directory query rejected, treating as empty");
                    return Ok(urls);
                }
                Err(e) if !urls.is_empty() => {
                    warn!(url, error = %e, "directory pagination failed mid-flight, returning partial");
                    return Ok(urls);
                }
                Err(e) => return Err(e),
            };

            let (records, total) = parse::range_records(&result);
            for record in &records {
                if let Some(entry) = parse::directory_entry_url(record) {
                    if seen.insert(entry.clone()) {
                        urls.push(entry);
                    }
                }
            }

            let fetched = records.len() as u64;
            start += fetched;
            if fetched < self.config.page_size || fetched == 0 {
                break;
            }
            if let Some(total) = total {
                if start >= total {
                    break;
                }
            }
        }

        Ok(urls)
    }

    async fn query_transaction(&self, tx_id: &str) -> Result<Option<PendingTx>> {
        match self.rpc("query_transaction", json!({ "txid": tx_id })).await {
            Ok(result) => Ok(parse::parse_transaction(tx_id, &result)),
            Err(WatchtowerError::Rpc { code, message }) => {
                debug!(tx_id, code, message, "transaction query rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn query_transaction_raw(&self, tx_id: &str) -> Result<Option<Value>> {
        match self.rpc("query_transaction_raw", json!({ "txid": tx_id })).await {
            Ok(result) => Ok(Some(result)),
            Err(WatchtowerError::Rpc { code, message }) => {
                debug!(tx_id, code, message, "raw transaction query rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn account_exists(&self, url: &str) -> Result<bool> {
        match self.query_scope("account_exists", &normalize_url(url)).await {
            Ok(_) => Ok(true),
            Err(WatchtowerError::Rpc { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
