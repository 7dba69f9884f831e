//! Inbox store
//!
//! MongoDB-backed persistence for users, their on-chain identities, and
//! the per-user pending-action inbox the discovery engine maintains.

pub mod inbox;
pub mod schemas;

use async_trait::async_trait;

use crate::types::Result;

pub use inbox::MongoInboxStore;
pub use schemas::{
    AccountStub, IdentityRecord, InboxSummaryDoc, KeyBookRecord, KeyEntryRecord, KeyPageRecord,
    PendingActionDoc, RenderedSignature, UserRecord,
};

/// Store operations the discovery pipeline depends on.
///
/// The single write path, `apply_inbox_diff`, is atomic: either every
/// delete, upsert, and the summary land together or the user's inbox is
/// untouched and the cycle retries next tick.
#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Users that completed onboarding and key-vault setup, with their
    /// identities joined in. Users without the gate flags are invisible
    /// to discovery.
    async fn list_users_with_identities(&self) -> Result<Vec<UserRecord>>;

    /// The user's current inbox documents.
    async fn get_inbox(&self, uid: &str) -> Result<Vec<PendingActionDoc>>;

    /// The user's current computed summary, if one exists.
    async fn get_summary(&self, uid: &str) -> Result<Option<InboxSummaryDoc>>;

    /// Atomically remove `remove_hashes`, upsert `upserts` (merge
    /// semantics keyed by canonical tx hash), and write the summary.
    async fn apply_inbox_diff(
        &self,
        uid: &str,
        upserts: Vec<PendingActionDoc>,
        remove_hashes: Vec<String>,
        summary: InboxSummaryDoc,
    ) -> Result<()>;

    /// Refresh the stored key-book view of one identity from the live
    /// ledger snapshot taken during path exploration.
    async fn save_identity_snapshot(
        &self,
        uid: &str,
        identity_url: &str,
        books: Vec<KeyBookRecord>,
    ) -> Result<()>;
}
