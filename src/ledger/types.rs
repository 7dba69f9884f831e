//! Typed views of ledger data
//!
//! These are built from the ledger's dynamic JSON responses by
//! `ledger::parse`; all URL and hash fields hold canonical forms.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::canonical::normalize_url;

/// Execution status of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Delivered,
    Remote,
    Failed,
    Expired,
    Unknown,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Delivered => "delivered",
            TxStatus::Remote => "remote",
            TxStatus::Failed => "failed",
            TxStatus::Expired => "expired",
            TxStatus::Unknown => "unknown",
        }
    }
}

/// A signer's vote on a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Approve,
    Reject,
    Abstain,
}

impl Vote {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vote::Approve => "approve",
            Vote::Reject => "reject",
            Vote::Abstain => "abstain",
        }
    }
}

/// One signature observed on a pending transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    /// Canonical URL of the signing key page.
    pub signer: String,
    /// Canonical hex key hash; empty for nested delegated forms that
    /// never surface the inner key.
    pub public_key_hash: String,
    pub vote: Vote,
    /// Unix milliseconds.
    pub timestamp_ms: i64,
}

/// A not-yet-finalized transaction as seen by discovery.
#[derive(Debug, Clone)]
pub struct PendingTx {
    /// Opaque transaction id as the ledger reports it.
    pub tx_id: String,
    /// Canonical transaction hash.
    pub hash: String,
    /// Canonical URL of the targeted account.
    pub principal: String,
    pub tx_type: String,
    pub status: TxStatus,
    pub signatures: Vec<SignatureRecord>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Opaque transaction body, carried through for the inbox UI.
    pub body: Value,
}

/// An entry on a key page: either a key the holder controls directly or
/// a delegation to another key page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEntry {
    Key { public_key_hash: String },
    Delegate { url: String },
}

/// A live key page fetched from the ledger.
#[derive(Debug, Clone)]
pub struct KeyPage {
    pub url: String,
    pub version: u64,
    pub threshold: u32,
    pub credit_balance: u64,
    pub entries: Vec<KeyEntry>,
}

impl KeyPage {
    /// Canonical URLs of every delegate entry on this page.
    pub fn delegates(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                KeyEntry::Delegate { url } => Some(normalize_url(url)),
                KeyEntry::Key { .. } => None,
            })
            .collect()
    }
}

/// A window of raw signature-chain records plus the chain's total height.
#[derive(Debug, Clone, Default)]
pub struct SignatureChainSlice {
    pub records: Vec<Value>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delegates_are_canonical() {
        let page = KeyPage {
            url: "acc://a.acme/book/1".into(),
            version: 1,
            threshold: 1,
            credit_balance: 0,
            entries: vec![
                KeyEntry::Key {
                    public_key_hash: "aa".into(),
                },
                KeyEntry::Delegate {
                    url: "ACC://B.Acme/Book/1".into(),
                },
            ],
        };
        assert_eq!(page.delegates(), vec!["acc://b.acme/book/1".to_string()]);
    }
}
