//! Document schemas for the inbox store
//!
//! Field names are camelCase on the wire to match the client app's
//! reads. Optional fields skip serialization entirely so absent values
//! never land in a document.

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use crate::canonical::{normalize_hash, normalize_url};
use crate::ledger::{KeyEntry, KeyPage};

/// Default collection name for user documents.
pub const DEFAULT_USERS_COLLECTION: &str = "users";
/// Collection of per-user on-chain identities.
pub const ADIS_COLLECTION: &str = "adis";
/// Collection of per-user pending-action inbox documents.
pub const PENDING_ACTIONS_COLLECTION: &str = "pending_actions";
/// Collection of per-user computed inbox summaries.
pub const COMPUTED_STATE_COLLECTION: &str = "computed_state";

/// A registered user. Only users with both gate flags set are processed.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub uid: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Canonical URL of the identity the client app surfaces first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_identity: Option<String>,

    #[serde(default)]
    pub onboarding_complete: bool,

    #[serde(default)]
    pub key_vault_setup: bool,

    /// Joined in from the adis collection by the store adapter; never
    /// persisted on the user document itself.
    #[serde(skip)]
    pub identities: Vec<IdentityRecord>,
}

/// One user-controlled on-chain identity (ADI) with its stored key-book
/// view. The stored view may lag the ledger; discovery refreshes it each
/// cycle.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub uid: String,

    pub identity_url: String,

    #[serde(default)]
    pub key_books: Vec<KeyBookRecord>,

    #[serde(default)]
    pub accounts: Vec<AccountStub>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_balance: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

/// Sub-account stub under an identity (token accounts, data accounts).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccountStub {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct KeyBookRecord {
    pub url: String,
    #[serde(default)]
    pub pages: Vec<KeyPageRecord>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct KeyPageRecord {
    pub url: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default = "default_threshold")]
    pub threshold: i64,
    #[serde(default)]
    pub credit_balance: i64,
    #[serde(default)]
    pub entries: Vec<KeyEntryRecord>,
}

fn default_threshold() -> i64 {
    1
}

/// Stored key-page entry: exactly one of the two fields is present.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct KeyEntryRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate: Option<String>,
}

impl KeyPageRecord {
    /// Snapshot a live ledger key page for storage.
    pub fn from_live(page: &KeyPage) -> Self {
        Self {
            url: normalize_url(&page.url),
            version: page.version as i64,
            threshold: page.threshold as i64,
            credit_balance: page.credit_balance as i64,
            entries: page
                .entries
                .iter()
                .map(|entry| match entry {
                    KeyEntry::Key { public_key_hash } => KeyEntryRecord {
                        public_key_hash: Some(normalize_hash(public_key_hash)),
                        delegate: None,
                    },
                    KeyEntry::Delegate { url } => KeyEntryRecord {
                        public_key_hash: None,
                        delegate: Some(normalize_url(url)),
                    },
                })
                .collect(),
        }
    }

    /// Canonical delegate URLs stored on this page.
    pub fn delegates(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| e.delegate.as_deref().map(normalize_url))
            .collect()
    }

    /// Canonical key hashes stored on this page.
    pub fn key_hashes(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| e.public_key_hash.as_deref().map(normalize_hash))
            .collect()
    }
}

/// Rendered signature inside a pending-action document.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RenderedSignature {
    pub signer: String,
    pub public_key_hash: String,
    pub vote: String,
    pub signed_at: DateTime,
}

/// One inbox entry, keyed by (uid, canonical tx hash).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PendingActionDoc {
    pub uid: String,

    /// Canonical transaction hash; the document key within the user's
    /// inbox.
    pub tx_hash: String,

    pub tx_id: String,
    pub principal: String,
    pub tx_type: String,

    /// pending | partially_signed | awaiting_signatures
    pub status: String,

    /// critical | warning | normal
    pub urgency_level: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining_ms: Option<i64>,

    #[serde(default)]
    pub is_expiring: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime>,

    /// initiated_by_user | requiring_signature
    pub category: String,

    #[serde(default)]
    pub signatures: Vec<RenderedSignature>,

    #[serde(default)]
    pub eligible_signing_paths: Vec<String>,

    #[serde(default)]
    pub user_has_signed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovered_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

/// Per-user inbox aggregate, one document per user.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct InboxSummaryDoc {
    pub uid: String,

    pub count: i64,

    /// Entries expiring within the next 24 hours.
    pub urgent_count: i64,

    pub initiated_count: i64,
    pub requiring_signature_count: i64,

    /// Canonical tx hashes in discovery insertion order.
    #[serde(default)]
    pub tx_hashes: Vec<String>,

    /// Opaque token correlating this snapshot to the producing cycle.
    pub cycle_token: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_at: Option<DateTime>,
}
