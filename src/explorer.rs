//! Signing-path explorer
//!
//! Enumerates every distinct chain of key pages through which a user's
//! identity can ultimately sign: single-hop paths for pages the identity
//! owns directly, multi-hop paths through delegate entries. The walk is
//! a bounded DFS over the delegation graph; production graphs contain
//! back-edges, so the visited set and depth cap are load-bearing.

use std::collections::HashSet;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use crate::canonical::normalize_url;
use crate::ledger::{LedgerApi, RpcTally};
use crate::store::{IdentityRecord, KeyBookRecord, KeyPageRecord};

/// An ordered, cycle-free sequence of key-page URLs. The last hop is the
/// page whose pending queue carries the user's outstanding work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningPath {
    pub hops: Vec<String>,
}

impl SigningPath {
    pub fn direct(page_url: String) -> Self {
        Self { hops: vec![page_url] }
    }

    pub fn is_direct(&self) -> bool {
        self.hops.len() == 1
    }

    pub fn final_signer(&self) -> &str {
        self.hops.last().map(String::as_str).unwrap_or("")
    }

    /// The hop that delegates to the final signer; None on direct paths.
    pub fn prior_hop(&self) -> Option<&str> {
        if self.hops.len() >= 2 {
            self.hops.get(self.hops.len() - 2).map(String::as_str)
        } else {
            None
        }
    }

    /// Human rendering used in inbox documents: `"a -> b -> c"`.
    pub fn rendering(&self) -> String {
        self.hops.join(" -> ")
    }
}

/// Everything exploration learned about one identity.
#[derive(Debug, Default)]
pub struct ExplorationResult {
    pub paths: Vec<SigningPath>,
    /// Live key-book snapshots, for refreshing the stored identity.
    pub live_books: Vec<KeyBookRecord>,
    /// Canonical directory entries of the identity URL, reused by the
    /// discovery engine's account enumeration.
    pub directory: Vec<String>,
}

/// Walks an identity's key books and delegation graph.
pub struct PathExplorer<'a> {
    ledger: &'a dyn LedgerApi,
    max_depth: u32,
}

impl<'a> PathExplorer<'a> {
    pub fn new(ledger: &'a dyn LedgerApi, max_depth: u32) -> Self {
        Self { ledger, max_depth }
    }

    /// Enumerate signing paths for one identity.
    ///
    /// Stored pages are registered first (the stored view may be stale
    /// but is free); the ledger's live page enumeration then fills in
    /// pages the store has not seen yet. The visited set is shared
    /// across all DFS launches for the identity.
    pub async fn explore_identity(
        &self,
        identity: &IdentityRecord,
        tally: &RpcTally,
    ) -> ExplorationResult {
        let identity_url = normalize_url(&identity.identity_url);

        let mut visited: HashSet<String> = HashSet::new();
        let mut paths: Vec<SigningPath> = Vec::new();
        let mut direct_pages: HashSet<String> = HashSet::new();

        // Seed the key-book set: stored books plus every directory entry.
        // Non-books cost one page-count query and drop out below.
        let mut book_urls: Vec<String> = Vec::new();
        let mut book_seen: HashSet<String> = HashSet::new();
        for book in &identity.key_books {
            let url = normalize_url(&book.url);
            if book_seen.insert(url.clone()) {
                book_urls.push(url);
            }
        }
        let directory = self.ledger.query_directory(&identity_url).await;
        tally.note(&directory);
        let directory = match directory {
            Ok(entries) => {
                for entry in &entries {
                    if book_seen.insert(entry.clone()) {
                        book_urls.push(entry.clone());
                    }
                }
                entries
            }
            Err(e) => {
                warn!(identity = %identity_url, error = %e, "directory query failed, using stored books only");
                Vec::new()
            }
        };

        // Stored pages: register direct paths and chase their delegates.
        for book in &identity.key_books {
            for page in &book.pages {
                let page_url = normalize_url(&page.url);
                self.register_direct(&page_url, &mut direct_pages, &mut visited, &mut paths);
                for delegate in page.delegates() {
                    self.follow_delegation_chain(
                        delegate,
                        vec![page_url.clone()],
                        &mut visited,
                        &mut paths,
                        1,
                        tally,
                    )
                    .await;
                }
            }
        }

        // Live enumeration: every page the ledger says each book has.
        let mut live_books = Vec::new();
        for book_url in &book_urls {
            let count = self.ledger.query_key_book_page_count(book_url).await;
            tally.note(&count);
            let count = match count {
                Ok(c) => c,
                Err(e) => {
                    debug!(book = %book_url, error = %e, "page-count query failed, skipping book");
                    continue;
                }
            };
            if count == 0 {
                continue;
            }

            let mut book_record = KeyBookRecord {
                url: book_url.clone(),
                pages: Vec::new(),
            };

            for page_number in 1..=count {
                let page_url = normalize_url(&format!("{book_url}/{page_number}"));
                let page = self.ledger.query_key_page(&page_url).await;
                tally.note(&page);
                let page = match page {
                    Ok(Some(p)) => p,
                    Ok(None) => {
                        debug!(page = %page_url, "ledger did not return a key page");
                        continue;
                    }
                    Err(e) => {
                        debug!(page = %page_url, error = %e, "key-page query failed");
                        continue;
                    }
                };

                book_record.pages.push(KeyPageRecord::from_live(&page));
                self.register_direct(&page_url, &mut direct_pages, &mut visited, &mut paths);
                for delegate in page.delegates() {
                    self.follow_delegation_chain(
                        delegate,
                        vec![page_url.clone()],
                        &mut visited,
                        &mut paths,
                        1,
                        tally,
                    )
                    .await;
                }
            }

            live_books.push(book_record);
        }

        debug!(
            identity = %identity_url,
            paths = paths.len(),
            live_books = live_books.len(),
            "identity exploration complete"
        );

        ExplorationResult {
            paths,
            live_books,
            directory,
        }
    }

    /// Record a page the identity owns directly. Owned pages also enter
    /// the visited set so a delegation back-edge to the source never
    /// produces a path with duplicate hops.
    fn register_direct(
        &self,
        page_url: &str,
        direct_pages: &mut HashSet<String>,
        visited: &mut HashSet<String>,
        paths: &mut Vec<SigningPath>,
    ) {
        if direct_pages.insert(page_url.to_string()) {
            visited.insert(page_url.to_string());
            paths.push(SigningPath::direct(page_url.to_string()));
        }
    }

    /// Depth-first walk from one delegate reference.
    ///
    /// `depth` is 1 for the first hop off the source page and the cap is
    /// strict: a hop at `depth > max_depth` is abandoned.
    fn follow_delegation_chain<'b>(
        &'b self,
        target: String,
        current_path: Vec<String>,
        visited: &'b mut HashSet<String>,
        results: &'b mut Vec<SigningPath>,
        depth: u32,
        tally: &'b RpcTally,
    ) -> BoxFuture<'b, ()> {
        async move {
            let target = normalize_url(&target);
            if depth > self.max_depth {
                debug!(target = %target, depth, "delegation depth cap reached");
                return;
            }
            if visited.contains(&target) {
                return;
            }
            visited.insert(target.clone());

            let exists = self.ledger.account_exists(&target).await;
            tally.note(&exists);
            match exists {
                Ok(true) => {}
                Ok(false) => {
                    debug!(target = %target, "delegate does not exist, dropping");
                    return;
                }
                Err(e) => {
                    debug!(target = %target, error = %e, "existence probe failed, dropping");
                    return;
                }
            }

            let mut new_path = current_path;
            new_path.push(target.clone());
            results.push(SigningPath {
                hops: new_path.clone(),
            });

            let page = self.ledger.query_key_page(&target).await;
            tally.note(&page);
            if let Ok(Some(page)) = page {
                for delegate in page.delegates() {
                    self.follow_delegation_chain(
                        delegate,
                        new_path.clone(),
                        visited,
                        results,
                        depth + 1,
                        tally,
                    )
                    .await;
                }
            }
        }
        .boxed()
    }
}
