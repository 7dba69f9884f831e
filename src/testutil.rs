//! In-memory ledger and store doubles shared across module tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::canonical::{normalize_hash, normalize_url};
use crate::ledger::{
    KeyPage, LedgerApi, PendingTx, SignatureChainSlice, SignatureRecord, TxStatus, Vote,
};
use crate::store::{InboxStore, InboxSummaryDoc, KeyBookRecord, PendingActionDoc, UserRecord};
use crate::types::{Result, WatchtowerError};

/// Build a pending transaction from a ledger-style tx id.
pub fn pending_tx(tx_id: &str, principal: &str, signatures: Vec<SignatureRecord>) -> PendingTx {
    PendingTx {
        tx_id: tx_id.to_string(),
        hash: normalize_hash(tx_id),
        principal: normalize_url(principal),
        tx_type: "sendTokens".to_string(),
        status: TxStatus::Pending,
        signatures,
        expires_at: None,
        body: Value::Null,
    }
}

/// An approve signature with a fixed timestamp.
pub fn signature(signer: &str, key_hash: &str) -> SignatureRecord {
    SignatureRecord {
        signer: normalize_url(signer),
        public_key_hash: normalize_hash(key_hash),
        vote: Vote::Approve,
        timestamp_ms: 1_700_000_000_000,
    }
}

/// In-memory ledger. All lookups are canonical; `fail_all` simulates a
/// total outage (every call errors).
#[derive(Default)]
pub struct MockLedger {
    pub pending: HashMap<String, Vec<String>>,
    pub txs: HashMap<String, PendingTx>,
    pub raw: HashMap<String, Value>,
    pub books: HashMap<String, u64>,
    pub pages: HashMap<String, KeyPage>,
    pub directories: HashMap<String, Vec<String>>,
    pub chains: HashMap<String, Vec<Value>>,
    pub existing: HashSet<String>,
    pub fail_all: bool,
}

impl MockLedger {
    pub fn add_pending(&mut self, scope: &str, tx: &PendingTx) {
        self.pending
            .entry(normalize_url(scope))
            .or_default()
            .push(tx.tx_id.clone());
        self.add_transaction(tx);
    }

    pub fn add_transaction(&mut self, tx: &PendingTx) {
        self.txs.insert(tx.tx_id.clone(), tx.clone());
        self.txs.insert(normalize_hash(&tx.hash), tx.clone());
    }

    pub fn add_book(&mut self, url: &str, page_count: u64) {
        let url = normalize_url(url);
        self.existing.insert(url.clone());
        self.books.insert(url, page_count);
    }

    pub fn add_page(&mut self, page: KeyPage) {
        let url = normalize_url(&page.url);
        self.existing.insert(url.clone());
        self.pages.insert(url, page);
    }

    pub fn add_directory_entry(&mut self, identity: &str, entry: &str) {
        self.directories
            .entry(normalize_url(identity))
            .or_default()
            .push(normalize_url(entry));
    }

    pub fn add_chain_record(&mut self, book: &str, record: Value) {
        self.chains.entry(normalize_url(book)).or_default().push(record);
    }

    pub fn mark_existing(&mut self, url: &str) {
        self.existing.insert(normalize_url(url));
    }

    fn unavailable<T>(&self) -> Result<T> {
        Err(WatchtowerError::Transport("mock ledger unavailable".into()))
    }
}

#[async_trait]
impl LedgerApi for MockLedger {
    async fn query_pending_tx_ids(&self, scope: &str) -> Result<Vec<String>> {
        if self.fail_all {
            return self.unavailable();
        }
        Ok(self
            .pending
            .get(&normalize_url(scope))
            .cloned()
            .unwrap_or_default())
    }

    async fn query_key_book_page_count(&self, url: &str) -> Result<u64> {
        if self.fail_all {
            return self.unavailable();
        }
        Ok(self.books.get(&normalize_url(url)).copied().unwrap_or(0))
    }

    async fn query_key_page(&self, url: &str) -> Result<Option<KeyPage>> {
        if self.fail_all {
            return self.unavailable();
        }
        Ok(self.pages.get(&normalize_url(url)).cloned())
    }

    async fn query_signature_chain(
        &self,
        url: &str,
        start: u64,
        count: u64,
        _expand: bool,
    ) -> Result<SignatureChainSlice> {
        if self.fail_all {
            return self.unavailable();
        }
        let records = self.chains.get(&normalize_url(url)).cloned().unwrap_or_default();
        let total = records.len() as u64;
        let from = (start as usize).min(records.len());
        let to = ((start + count) as usize).min(records.len());
        Ok(SignatureChainSlice {
            records: records[from..to].to_vec(),
            total,
        })
    }

    async fn query_directory(&self, url: &str) -> Result<Vec<String>> {
        if self.fail_all {
            return self.unavailable();
        }
        Ok(self
            .directories
            .get(&normalize_url(url))
            .cloned()
            .unwrap_or_default())
    }

    async fn query_transaction(&self, tx_id: &str) -> Result<Option<PendingTx>> {
        if self.fail_all {
            return self.unavailable();
        }
        Ok(self
            .txs
            .get(tx_id)
            .or_else(|| self.txs.get(&normalize_hash(tx_id)))
            .cloned())
    }

    async fn query_transaction_raw(&self, tx_id: &str) -> Result<Option<Value>> {
        if self.fail_all {
            return self.unavailable();
        }
        if let Some(raw) = self.raw.get(tx_id) {
            return Ok(Some(raw.clone()));
        }
        Ok(self
            .txs
            .get(tx_id)
            .or_else(|| self.txs.get(&normalize_hash(tx_id)))
            .map(|tx| json!({ "status": tx.status.as_str() })))
    }

    async fn account_exists(&self, url: &str) -> Result<bool> {
        if self.fail_all {
            return self.unavailable();
        }
        let url = normalize_url(url);
        Ok(self.existing.contains(&url)
            || self.pages.contains_key(&url)
            || self.books.contains_key(&url))
    }
}

/// In-memory inbox store tracking writes for assertions.
#[derive(Default)]
pub struct MockStore {
    pub users: Vec<UserRecord>,
    pub inbox: Mutex<HashMap<String, Vec<PendingActionDoc>>>,
    pub summaries: Mutex<HashMap<String, InboxSummaryDoc>>,
    pub snapshots: Mutex<Vec<(String, String, Vec<KeyBookRecord>)>>,
    pub diff_applications: Mutex<u64>,
    pub fail_writes: bool,
}

impl MockStore {
    pub fn with_users(users: Vec<UserRecord>) -> Self {
        Self {
            users,
            ..Default::default()
        }
    }

    pub fn seed_inbox(&self, uid: &str, docs: Vec<PendingActionDoc>) {
        self.inbox.lock().unwrap().insert(uid.to_string(), docs);
    }

    pub fn inbox_hashes(&self, uid: &str) -> Vec<String> {
        self.inbox
            .lock()
            .unwrap()
            .get(uid)
            .map(|docs| docs.iter().map(|d| d.tx_hash.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl InboxStore for MockStore {
    async fn list_users_with_identities(&self) -> Result<Vec<UserRecord>> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.onboarding_complete && u.key_vault_setup)
            .cloned()
            .collect())
    }

    async fn get_inbox(&self, uid: &str) -> Result<Vec<PendingActionDoc>> {
        Ok(self.inbox.lock().unwrap().get(uid).cloned().unwrap_or_default())
    }

    async fn get_summary(&self, uid: &str) -> Result<Option<InboxSummaryDoc>> {
        Ok(self.summaries.lock().unwrap().get(uid).cloned())
    }

    async fn apply_inbox_diff(
        &self,
        uid: &str,
        upserts: Vec<PendingActionDoc>,
        remove_hashes: Vec<String>,
        summary: InboxSummaryDoc,
    ) -> Result<()> {
        if self.fail_writes {
            return Err(WatchtowerError::Database("mock store write failure".into()));
        }

        let mut inbox = self.inbox.lock().unwrap();
        let docs = inbox.entry(uid.to_string()).or_default();
        docs.retain(|d| !remove_hashes.contains(&d.tx_hash));
        for upsert in upserts {
            match docs.iter_mut().find(|d| d.tx_hash == upsert.tx_hash) {
                Some(existing) => *existing = upsert,
                None => docs.push(upsert),
            }
        }

        self.summaries.lock().unwrap().insert(uid.to_string(), summary);
        *self.diff_applications.lock().unwrap() += 1;
        Ok(())
    }

    async fn save_identity_snapshot(
        &self,
        uid: &str,
        identity_url: &str,
        books: Vec<KeyBookRecord>,
    ) -> Result<()> {
        self.snapshots
            .lock()
            .unwrap()
            .push((uid.to_string(), identity_url.to_string(), books));
        Ok(())
    }
}
