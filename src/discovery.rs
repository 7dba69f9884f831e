//! Three-phase discovery engine
//!
//! Computes, for one user, the deduplicated set of pending transactions
//! the user is eligible to sign:
//!
//! 1. **Signing paths**: the pending queue of every delegated final
//!    signer, kept when the prior hop has not signed yet.
//! 2. **Direct accounts**: the pending queue of every account the
//!    user's identities own, kept when none of the user's keys has
//!    signed.
//! 3. **Signature-chain scan**: the tail of each key book's signature
//!    chain, catching cross-identity signature requests the first two
//!    phases cannot see.
//!
//! Failures inside the per-path / per-account / per-book loops are
//! logged and swallowed; discovery returns whatever succeeded. Only the
//! RPC tally decides afterwards whether the ledger was reachable at all.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use crate::canonical::{extract_adi, is_key_book_url, normalize_hash, normalize_url};
use crate::explorer::{ExplorationResult, SigningPath};
use crate::ledger::{LedgerApi, PendingTx, RpcTally, SignatureRecord, TxStatus};
use crate::store::{AccountStub, IdentityRecord, KeyBookRecord, UserRecord};

/// How many trailing signature-chain entries Phase 3 inspects per book.
/// Older missed requests surface on later cycles once the identity
/// metadata refresh catches up.
const SIGNATURE_CHAIN_SCAN_DEPTH: u64 = 30;

/// Why a transaction landed in the user's inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    InitiatedByUser,
    RequiringSignature,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::InitiatedByUser => "initiated_by_user",
            Category::RequiringSignature => "requiring_signature",
        }
    }
}

/// One transaction the user can act on, with every path that authorizes
/// them to sign it.
#[derive(Debug, Clone)]
pub struct EligibleTx {
    pub tx: PendingTx,
    /// Path renderings, insertion-ordered and deduplicated.
    pub paths: Vec<String>,
    pub category: Category,
}

/// Hash-keyed set of eligible transactions that remembers insertion
/// order. Re-inserting a hash merges: paths union, category promoted to
/// `InitiatedByUser` if any contributor reports it.
#[derive(Debug, Default)]
pub struct EligibleSet {
    order: Vec<String>,
    map: HashMap<String, EligibleTx>,
}

impl EligibleSet {
    pub fn insert(&mut self, tx: PendingTx, category: Category, path: String) {
        let hash = normalize_hash(&tx.hash);
        match self.map.get_mut(&hash) {
            Some(existing) => {
                if !existing.paths.contains(&path) {
                    existing.paths.push(path);
                }
                if category == Category::InitiatedByUser {
                    existing.category = Category::InitiatedByUser;
                }
            }
            None => {
                self.order.push(hash.clone());
                self.map.insert(
                    hash,
                    EligibleTx {
                        tx,
                        paths: vec![path],
                        category,
                    },
                );
            }
        }
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.map.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, hash: &str) -> Option<&EligibleTx> {
        self.map.get(hash)
    }

    /// Hashes in insertion order.
    pub fn hashes(&self) -> &[String] {
        &self.order
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &EligibleTx)> {
        self.order.iter().filter_map(|h| self.map.get(h).map(|e| (h, e)))
    }
}

/// Per-identity input to discovery: the stored record plus what the
/// path explorer learned live this cycle.
#[derive(Debug, Default)]
pub struct IdentityExploration {
    pub identity_url: String,
    pub stored_books: Vec<KeyBookRecord>,
    pub accounts: Vec<AccountStub>,
    pub paths: Vec<SigningPath>,
    pub live_books: Vec<KeyBookRecord>,
    pub directory: Vec<String>,
}

impl IdentityExploration {
    pub fn from_parts(identity: &IdentityRecord, exploration: ExplorationResult) -> Self {
        Self {
            identity_url: normalize_url(&identity.identity_url),
            stored_books: identity.key_books.clone(),
            accounts: identity.accounts.clone(),
            paths: exploration.paths,
            live_books: exploration.live_books,
            directory: exploration.directory,
        }
    }
}

/// Output of one user's discovery run.
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    pub eligible: EligibleSet,
    /// Last observed signatures per tx hash, cached so the reconciler
    /// does not re-query.
    pub signatures_by_hash: HashMap<String, Vec<SignatureRecord>>,
    pub rpc_attempts: u64,
    pub rpc_failures: u64,
}

impl DiscoveryResult {
    /// True when every RPC this cycle failed. Reconciling against such a
    /// result would wipe the inbox on a transient outage, so the caller
    /// must skip the write instead.
    pub fn ledger_unreachable(&self) -> bool {
        self.rpc_attempts > 0 && self.rpc_failures == self.rpc_attempts
    }
}

pub struct DiscoveryEngine<'a> {
    ledger: &'a dyn LedgerApi,
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(ledger: &'a dyn LedgerApi) -> Self {
        Self { ledger }
    }

    pub async fn discover(
        &self,
        user: &UserRecord,
        explorations: &[IdentityExploration],
        tally: &RpcTally,
    ) -> DiscoveryResult {
        let mut result = DiscoveryResult::default();
        let user_hashes = user_key_hashes(explorations);

        self.phase_signing_paths(explorations, &mut result, tally).await;
        self.phase_direct_accounts(explorations, &user_hashes, &mut result, tally)
            .await;
        self.phase_signature_chains(explorations, &user_hashes, &mut result, tally)
            .await;

        result.rpc_attempts = tally.attempts();
        result.rpc_failures = tally.failures();

        debug!(
            uid = %user.uid,
            eligible = result.eligible.len(),
            rpc_attempts = result.rpc_attempts,
            rpc_failures = result.rpc_failures,
            "discovery complete"
        );
        result
    }

    /// Phase 1: delegated paths. The predicate is on the *prior hop*,
    /// not the user's keys: the user may hold no key on the final
    /// signer yet be the authority through delegation.
    async fn phase_signing_paths(
        &self,
        explorations: &[IdentityExploration],
        result: &mut DiscoveryResult,
        tally: &RpcTally,
    ) {
        for exploration in explorations {
            for path in exploration.paths.iter().filter(|p| !p.is_direct()) {
                let final_signer = path.final_signer().to_string();
                let Some(prior) = path.prior_hop().map(normalize_url) else {
                    continue;
                };

                let tx_ids = self.ledger.query_pending_tx_ids(&final_signer).await;
                tally.note(&tx_ids);
                let tx_ids = match tx_ids {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!(signer = %final_signer, error = %e, "pending query failed for path, skipping");
                        continue;
                    }
                };

                for tx_id in tx_ids {
                    let Some(tx) = self.fetch_transaction(&tx_id, tally).await else {
                        continue;
                    };
                    result
                        .signatures_by_hash
                        .insert(tx.hash.clone(), tx.signatures.clone());

                    let prior_signed = tx
                        .signatures
                        .iter()
                        .any(|sig| normalize_url(&sig.signer) == prior);
                    if !prior_signed {
                        result
                            .eligible
                            .insert(tx, Category::RequiringSignature, path.rendering());
                    }
                }
            }
        }
    }

    /// Phase 2: every account the identity owns, under the user-key
    /// predicate.
    async fn phase_direct_accounts(
        &self,
        explorations: &[IdentityExploration],
        user_hashes: &HashSet<String>,
        result: &mut DiscoveryResult,
        tally: &RpcTally,
    ) {
        for exploration in explorations {
            for account in enumerate_accounts(exploration) {
                let tx_ids = self.ledger.query_pending_tx_ids(&account).await;
                tally.note(&tx_ids);
                let tx_ids = match tx_ids {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!(account = %account, error = %e, "pending query failed for account, skipping");
                        continue;
                    }
                };

                for tx_id in tx_ids {
                    let Some(tx) = self.fetch_transaction(&tx_id, tally).await else {
                        continue;
                    };
                    result
                        .signatures_by_hash
                        .insert(tx.hash.clone(), tx.signatures.clone());

                    if user_has_signed(&tx.signatures, user_hashes) {
                        continue;
                    }
                    let category = if extract_adi(&tx.principal) == exploration.identity_url {
                        Category::InitiatedByUser
                    } else {
                        Category::RequiringSignature
                    };
                    result.eligible.insert(tx, category, account.clone());
                }
            }
        }
    }

    /// Phase 3: tail of each key book's signature chain, catching
    /// signature requests whose principal is unrelated to the user's
    /// identities.
    async fn phase_signature_chains(
        &self,
        explorations: &[IdentityExploration],
        user_hashes: &HashSet<String>,
        result: &mut DiscoveryResult,
        tally: &RpcTally,
    ) {
        let mut seen: HashSet<String> = result.eligible.hashes().iter().cloned().collect();

        for exploration in explorations {
            for book in chain_scan_books(exploration) {
                let head = self.ledger.query_signature_chain(&book, 0, 1, false).await;
                tally.note(&head);
                let total = match head {
                    Ok(slice) => slice.total,
                    Err(e) => {
                        warn!(book = %book, error = %e, "signature-chain head query failed, skipping book");
                        continue;
                    }
                };
                if total == 0 {
                    continue;
                }

                let count = total.min(SIGNATURE_CHAIN_SCAN_DEPTH);
                let start = total - count;
                let window = self.ledger.query_signature_chain(&book, start, count, true).await;
                tally.note(&window);
                let window = match window {
                    Ok(slice) => slice,
                    Err(e) => {
                        warn!(book = %book, error = %e, "signature-chain window query failed, skipping book");
                        continue;
                    }
                };

                for record in &window.records {
                    for tx_id in produced_tx_ids(record) {
                        let hash = normalize_hash(&tx_id);
                        if hash.is_empty() || !seen.insert(hash.clone()) {
                            continue;
                        }

                        // Cheap status gate before paying the full parse.
                        let raw = self.ledger.query_transaction_raw(&tx_id).await;
                        tally.note(&raw);
                        let Ok(Some(raw)) = raw else {
                            continue;
                        };
                        if crate::ledger::parse::transaction_status(&raw) != TxStatus::Pending {
                            continue;
                        }

                        let Some(tx) = self.fetch_transaction(&tx_id, tally).await else {
                            continue;
                        };
                        result
                            .signatures_by_hash
                            .insert(tx.hash.clone(), tx.signatures.clone());

                        if !user_has_signed(&tx.signatures, user_hashes) {
                            result
                                .eligible
                                .insert(tx, Category::RequiringSignature, book.clone());
                        }
                    }
                }
            }
        }
    }

    async fn fetch_transaction(&self, tx_id: &str, tally: &RpcTally) -> Option<PendingTx> {
        let tx = self.ledger.query_transaction(tx_id).await;
        tally.note(&tx);
        match tx {
            Ok(Some(tx)) => Some(tx),
            Ok(None) => {
                debug!(tx_id, "transaction not found");
                None
            }
            Err(e) => {
                warn!(tx_id, error = %e, "transaction fetch failed, skipping");
                None
            }
        }
    }
}

/// Canonical key hashes the user controls, the ground truth of "has the
/// user already signed". Stored pages plus this cycle's live snapshots.
fn user_key_hashes(explorations: &[IdentityExploration]) -> HashSet<String> {
    let mut hashes = HashSet::new();
    for exploration in explorations {
        for book in exploration.stored_books.iter().chain(&exploration.live_books) {
            for page in &book.pages {
                for hash in page.key_hashes() {
                    hashes.insert(hash);
                }
            }
        }
    }
    hashes
}

/// Any signature by a key the user controls. Nested delegated forms can
/// carry an empty key hash; those never match.
pub fn user_has_signed(signatures: &[SignatureRecord], user_hashes: &HashSet<String>) -> bool {
    signatures.iter().any(|sig| {
        !sig.public_key_hash.is_empty() && user_hashes.contains(&normalize_hash(&sig.public_key_hash))
    })
}

/// Phase 2's account universe for one identity: the identity itself,
/// stored sub-accounts, stored books with their pages, live-enumerated
/// pages, and directory entries; canonically deduplicated, order
/// preserved.
fn enumerate_accounts(exploration: &IdentityExploration) -> Vec<String> {
    let mut accounts = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |url: String| {
        let url = normalize_url(&url);
        if !url.is_empty() && seen.insert(url.clone()) {
            accounts.push(url);
        }
    };

    push(exploration.identity_url.clone());
    for stub in &exploration.accounts {
        push(stub.url.clone());
    }
    for book in &exploration.stored_books {
        push(book.url.clone());
        for page in &book.pages {
            push(page.url.clone());
        }
    }
    for book in &exploration.live_books {
        push(book.url.clone());
        for page in &book.pages {
            push(page.url.clone());
        }
    }
    for entry in &exploration.directory {
        push(entry.clone());
    }
    accounts
}

/// Books whose signature chains Phase 3 scans: stored books always,
/// directory entries only when they look like key books.
fn chain_scan_books(exploration: &IdentityExploration) -> Vec<String> {
    let mut books = Vec::new();
    let mut seen = HashSet::new();
    for book in &exploration.stored_books {
        let url = normalize_url(&book.url);
        if seen.insert(url.clone()) {
            books.push(url);
        }
    }
    for entry in &exploration.directory {
        if is_key_book_url(entry) && seen.insert(entry.clone()) {
            books.push(entry.clone());
        }
    }
    books
}

/// Produced transaction ids of one signature-chain record: descend into
/// `value.message`, require a `signatureRequest`, then walk
/// `value.produced.records` reading `value` or `id`.
fn produced_tx_ids(record: &Value) -> Vec<String> {
    let Some(value) = record.get("value") else {
        return Vec::new();
    };
    let is_request = value
        .get("message")
        .and_then(|m| m.get("type"))
        .and_then(Value::as_str)
        == Some("signatureRequest");
    if !is_request {
        return Vec::new();
    }

    let Some(produced) = value
        .get("produced")
        .and_then(|p| p.get("records"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    produced
        .iter()
        .filter_map(|p| {
            p.get("value")
                .and_then(Value::as_str)
                .or_else(|| p.get("id").and_then(Value::as_str))
                .map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{KeyEntry, KeyPage, Vote};
    use crate::store::KeyPageRecord;
    use crate::testutil::{pending_tx, signature, MockLedger};
    use serde_json::json;

    fn user() -> UserRecord {
        UserRecord {
            uid: "u1".into(),
            onboarding_complete: true,
            key_vault_setup: true,
            ..Default::default()
        }
    }

    fn exploration_direct(identity: &str, book: &str, page: &str, key_hash: &str) -> IdentityExploration {
        IdentityExploration {
            identity_url: identity.into(),
            stored_books: vec![KeyBookRecord {
                url: book.into(),
                pages: vec![KeyPageRecord {
                    url: page.into(),
                    entries: vec![crate::store::KeyEntryRecord {
                        public_key_hash: Some(key_hash.into()),
                        delegate: None,
                    }],
                    ..Default::default()
                }],
            }],
            paths: vec![SigningPath::direct(page.into())],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_direct_pending_unsigned_is_eligible() {
        let mut ledger = MockLedger::default();
        let tx = pending_tx("acc://t1@alice.acme", "acc://alice.acme/tokens", vec![]);
        ledger.add_pending("acc://alice.acme/book/1", &tx);

        let exploration = exploration_direct(
            "acc://alice.acme",
            "acc://alice.acme/book",
            "acc://alice.acme/book/1",
            "aa",
        );
        let tally = RpcTally::default();
        let engine = DiscoveryEngine::new(&ledger);
        let result = engine.discover(&user(), &[exploration], &tally).await;

        assert_eq!(result.eligible.len(), 1);
        let eligible = result.eligible.get("t1").unwrap();
        assert_eq!(eligible.category, Category::RequiringSignature);
        assert!(result.signatures_by_hash.contains_key("t1"));
    }

    #[tokio::test]
    async fn test_principal_matching_identity_is_initiated() {
        let mut ledger = MockLedger::default();
        let tx = pending_tx("acc://t2@alice.acme", "acc://alice.acme", vec![]);
        ledger.add_pending("acc://alice.acme/book/1", &tx);

        let exploration = exploration_direct(
            "acc://alice.acme",
            "acc://alice.acme/book",
            "acc://alice.acme/book/1",
            "aa",
        );
        let tally = RpcTally::default();
        let engine = DiscoveryEngine::new(&ledger);
        let result = engine.discover(&user(), &[exploration], &tally).await;

        assert_eq!(
            result.eligible.get("t2").unwrap().category,
            Category::InitiatedByUser
        );
    }

    #[tokio::test]
    async fn test_already_signed_is_excluded() {
        let mut ledger = MockLedger::default();
        let tx = pending_tx(
            "acc://t3@alice.acme",
            "acc://alice.acme/tokens",
            vec![signature("acc://alice.acme/book/1", "aa")],
        );
        ledger.add_pending("acc://alice.acme/book/1", &tx);

        let exploration = exploration_direct(
            "acc://alice.acme",
            "acc://alice.acme/book",
            "acc://alice.acme/book/1",
            "aa",
        );
        let tally = RpcTally::default();
        let engine = DiscoveryEngine::new(&ledger);
        let result = engine.discover(&user(), &[exploration], &tally).await;

        assert!(result.eligible.is_empty());
        // signatures are still cached for the reconciler
        assert!(result.signatures_by_hash.contains_key("t3"));
    }

    #[tokio::test]
    async fn test_delegated_path_prior_hop_predicate() {
        let mut ledger = MockLedger::default();
        // Pending on the delegated final signer; neither bob's page nor
        // bob's key appears in the signatures.
        let tx = pending_tx(
            "acc://t4@corp.acme",
            "acc://corp.acme/tokens",
            vec![signature("acc://other.acme/book/1", "zz")],
        );
        ledger.add_pending("acc://corp.acme/book/1", &tx);

        let exploration = IdentityExploration {
            identity_url: "acc://bob.acme".into(),
            paths: vec![
                SigningPath::direct("acc://bob.acme/book/1".into()),
                SigningPath {
                    hops: vec![
                        "acc://bob.acme/book/1".into(),
                        "acc://corp.acme/book/1".into(),
                    ],
                },
            ],
            ..Default::default()
        };
        let tally = RpcTally::default();
        let engine = DiscoveryEngine::new(&ledger);
        let result = engine.discover(&user(), &[exploration], &tally).await;

        let eligible = result.eligible.get("t4").unwrap();
        assert_eq!(eligible.category, Category::RequiringSignature);
        assert_eq!(
            eligible.paths,
            vec!["acc://bob.acme/book/1 -> acc://corp.acme/book/1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delegated_path_skipped_when_prior_signed() {
        let mut ledger = MockLedger::default();
        let tx = pending_tx(
            "acc://t5@corp.acme",
            "acc://corp.acme/tokens",
            vec![signature("acc://bob.acme/book/1", "")],
        );
        ledger.add_pending("acc://corp.acme/book/1", &tx);

        let exploration = IdentityExploration {
            identity_url: "acc://bob.acme".into(),
            paths: vec![SigningPath {
                hops: vec![
                    "acc://bob.acme/book/1".into(),
                    "acc://corp.acme/book/1".into(),
                ],
            }],
            ..Default::default()
        };
        let tally = RpcTally::default();
        let engine = DiscoveryEngine::new(&ledger);
        let result = engine.discover(&user(), &[exploration], &tally).await;

        assert!(result.eligible.is_empty());
    }

    #[tokio::test]
    async fn test_signature_chain_fallback() {
        let mut ledger = MockLedger::default();
        let tx = pending_tx("acc://t6@stranger.acme", "acc://stranger.acme/data", vec![]);
        ledger.add_transaction(&tx);
        ledger.add_chain_record(
            "acc://alice.acme/book",
            json!({
                "value": {
                    "message": { "type": "signatureRequest" },
                    "produced": { "records": [ { "value": "acc://t6@stranger.acme" } ] }
                }
            }),
        );

        let exploration = IdentityExploration {
            identity_url: "acc://alice.acme".into(),
            stored_books: vec![KeyBookRecord {
                url: "acc://alice.acme/book".into(),
                pages: Vec::new(),
            }],
            ..Default::default()
        };
        let tally = RpcTally::default();
        let engine = DiscoveryEngine::new(&ledger);
        let result = engine.discover(&user(), &[exploration], &tally).await;

        assert_eq!(result.eligible.len(), 1);
        let eligible = result.eligible.get("t6").unwrap();
        assert_eq!(eligible.category, Category::RequiringSignature);
        assert_eq!(eligible.paths, vec!["acc://alice.acme/book".to_string()]);
    }

    #[tokio::test]
    async fn test_signature_chain_skips_non_pending() {
        let mut ledger = MockLedger::default();
        let mut tx = pending_tx("acc://t7@x.acme", "acc://x.acme/data", vec![]);
        tx.status = TxStatus::Delivered;
        ledger.add_transaction(&tx);
        ledger.add_chain_record(
            "acc://alice.acme/book",
            json!({
                "value": {
                    "message": { "type": "signatureRequest" },
                    "produced": { "records": [ { "id": "acc://t7@x.acme" } ] }
                }
            }),
        );

        let exploration = IdentityExploration {
            identity_url: "acc://alice.acme".into(),
            stored_books: vec![KeyBookRecord {
                url: "acc://alice.acme/book".into(),
                pages: Vec::new(),
            }],
            ..Default::default()
        };
        let tally = RpcTally::default();
        let engine = DiscoveryEngine::new(&ledger);
        let result = engine.discover(&user(), &[exploration], &tally).await;

        assert!(result.eligible.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insertions_merge_and_promote() {
        let mut set = EligibleSet::default();
        let tx = pending_tx("acc://t8@a.acme", "acc://a.acme", vec![]);

        set.insert(tx.clone(), Category::RequiringSignature, "path-a".into());
        set.insert(tx.clone(), Category::InitiatedByUser, "path-b".into());
        set.insert(tx, Category::RequiringSignature, "path-a".into());

        assert_eq!(set.len(), 1);
        let entry = set.get("t8").unwrap();
        assert_eq!(entry.category, Category::InitiatedByUser);
        assert_eq!(entry.paths, vec!["path-a".to_string(), "path-b".to_string()]);
        assert_eq!(set.hashes(), ["t8".to_string()]);
    }

    #[tokio::test]
    async fn test_total_outage_detected() {
        let mut ledger = MockLedger::default();
        ledger.fail_all = true;

        let exploration = exploration_direct(
            "acc://alice.acme",
            "acc://alice.acme/book",
            "acc://alice.acme/book/1",
            "aa",
        );
        let tally = RpcTally::default();
        let engine = DiscoveryEngine::new(&ledger);
        let result = engine.discover(&user(), &[exploration], &tally).await;

        assert!(result.eligible.is_empty());
        assert!(result.rpc_attempts > 0);
        assert!(result.ledger_unreachable());
    }

    #[tokio::test]
    async fn test_eligible_keys_are_canonical_hashes() {
        let mut ledger = MockLedger::default();
        let tx = pending_tx("acc://AABB@alice.acme", "acc://alice.acme/tokens", vec![]);
        ledger.add_pending("acc://alice.acme/book/1", &tx);

        let exploration = exploration_direct(
            "acc://alice.acme",
            "acc://alice.acme/book",
            "acc://alice.acme/book/1",
            "aa",
        );
        let tally = RpcTally::default();
        let engine = DiscoveryEngine::new(&ledger);
        let result = engine.discover(&user(), &[exploration], &tally).await;

        for (hash, entry) in result.eligible.iter() {
            assert_eq!(*hash, normalize_hash(&entry.tx.hash));
        }
    }

    #[test]
    fn test_user_has_signed_ignores_empty_hashes() {
        let user_hashes: HashSet<String> = ["aa".to_string()].into_iter().collect();
        let empty_hash = signature("acc://x/book/1", "");
        assert!(!user_has_signed(&[empty_hash], &user_hashes));

        let matching = signature("acc://x/book/1", "AA");
        assert!(user_has_signed(&[matching], &user_hashes));
    }

    #[test]
    fn test_produced_tx_ids_requires_signature_request() {
        let not_request = json!({
            "value": {
                "message": { "type": "transaction" },
                "produced": { "records": [ { "value": "acc://x@y" } ] }
            }
        });
        assert!(produced_tx_ids(&not_request).is_empty());

        let request = json!({
            "value": {
                "message": { "type": "signatureRequest" },
                "produced": { "records": [ { "value": "acc://x@y" }, { "id": "acc://z@w" } ] }
            }
        });
        assert_eq!(produced_tx_ids(&request), vec!["acc://x@y", "acc://z@w"]);
    }

    #[tokio::test]
    async fn test_live_key_hashes_count_for_predicate() {
        // The user's key exists only in the live snapshot, not the
        // stored view; a signature with that key must still exclude.
        let mut ledger = MockLedger::default();
        let tx = pending_tx(
            "acc://t9@alice.acme",
            "acc://alice.acme/tokens",
            vec![signature("acc://alice.acme/book/1", "ff")],
        );
        ledger.add_pending("acc://alice.acme/book/1", &tx);

        let live_page = KeyPage {
            url: "acc://alice.acme/book/1".into(),
            version: 1,
            threshold: 1,
            credit_balance: 0,
            entries: vec![KeyEntry::Key {
                public_key_hash: "ff".into(),
            }],
        };
        let exploration = IdentityExploration {
            identity_url: "acc://alice.acme".into(),
            live_books: vec![KeyBookRecord {
                url: "acc://alice.acme/book".into(),
                pages: vec![KeyPageRecord::from_live(&live_page)],
            }],
            paths: vec![SigningPath::direct("acc://alice.acme/book/1".into())],
            ..Default::default()
        };
        let tally = RpcTally::default();
        let engine = DiscoveryEngine::new(&ledger);
        let result = engine.discover(&user(), &[exploration], &tally).await;

        assert!(result.eligible.is_empty());
    }

    #[test]
    fn test_signature_vote_defaults() {
        let sig = signature("acc://a/book/1", "aa");
        assert_eq!(sig.vote, Vote::Approve);
    }
}
