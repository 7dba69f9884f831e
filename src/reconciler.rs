//! Inbox reconciler
//!
//! Turns one cycle's discovery result into the user's inbox: builds the
//! per-action documents and the computed summary, diffs against the
//! current inbox, and hands the whole change set to the store's atomic
//! write. Fully idempotent across cycles; a crash between discovery and
//! commit simply reconciles again next tick.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::canonical::normalize_hash;
use crate::discovery::{DiscoveryResult, EligibleTx};
use crate::store::{InboxStore, InboxSummaryDoc, PendingActionDoc, RenderedSignature};
use crate::types::Result;

const HOUR_MS: i64 = 60 * 60 * 1_000;
const CRITICAL_WINDOW_MS: i64 = 4 * HOUR_MS;
const EXPIRING_WINDOW_MS: i64 = 24 * HOUR_MS;

/// What one reconcile run did (or would have done, in dry-run mode).
#[derive(Debug, Clone, Copy)]
pub struct ReconcileOutcome {
    pub upserts: usize,
    pub removed: usize,
    pub total: usize,
    pub dry_run: bool,
}

/// Diff the user's inbox against the discovered eligible set and commit.
pub async fn reconcile_inbox(
    store: &dyn InboxStore,
    uid: &str,
    discovery: &DiscoveryResult,
    dry_run: bool,
) -> Result<ReconcileOutcome> {
    let now = Utc::now();

    let current = store.get_inbox(uid).await?;
    let current_ids: HashSet<String> = current
        .iter()
        .map(|doc| normalize_hash(&doc.tx_hash))
        .collect();

    let new_ids: Vec<String> = discovery.eligible.hashes().to_vec();
    let new_set: HashSet<&String> = new_ids.iter().collect();

    let to_remove: Vec<String> = current_ids
        .iter()
        .filter(|id| !new_set.contains(*id))
        .cloned()
        .collect();

    // Full rebuild: merge-semantics upserts make rewriting survivors safe.
    let upserts: Vec<PendingActionDoc> = discovery
        .eligible
        .iter()
        .map(|(hash, eligible)| build_doc(uid, hash, eligible, now))
        .collect();

    let summary = build_summary(uid, &upserts, new_ids, now);

    let outcome = ReconcileOutcome {
        upserts: upserts.len(),
        removed: to_remove.len(),
        total: summary.count as usize,
        dry_run,
    };

    if dry_run {
        info!(
            uid,
            upserts = outcome.upserts,
            removed = outcome.removed,
            "dry run, skipping inbox write"
        );
        return Ok(outcome);
    }

    store.apply_inbox_diff(uid, upserts, to_remove, summary).await?;
    debug!(
        uid,
        upserts = outcome.upserts,
        removed = outcome.removed,
        total = outcome.total,
        "inbox reconciled"
    );
    Ok(outcome)
}

/// Build the inbox document for one eligible transaction.
pub fn build_doc(
    uid: &str,
    hash: &str,
    eligible: &EligibleTx,
    now: DateTime<Utc>,
) -> PendingActionDoc {
    let tx = &eligible.tx;

    let time_remaining_ms = tx
        .expires_at
        .map(|expires| (expires - now).num_milliseconds().max(0));

    let (urgency_level, is_expiring) = match time_remaining_ms {
        Some(ms) if ms < CRITICAL_WINDOW_MS => ("critical", true),
        Some(ms) if ms < EXPIRING_WINDOW_MS => ("warning", true),
        _ => ("normal", false),
    };

    let status = if tx.signatures.is_empty() {
        "pending"
    } else {
        "partially_signed"
    };

    let signatures = tx
        .signatures
        .iter()
        .map(|sig| RenderedSignature {
            signer: sig.signer.clone(),
            public_key_hash: sig.public_key_hash.clone(),
            vote: sig.vote.as_str().to_string(),
            signed_at: if sig.timestamp_ms > 0 {
                bson::DateTime::from_millis(sig.timestamp_ms)
            } else {
                bson::DateTime::from_millis(now.timestamp_millis())
            },
        })
        .collect();

    PendingActionDoc {
        uid: uid.to_string(),
        tx_hash: hash.to_string(),
        tx_id: tx.tx_id.clone(),
        principal: tx.principal.clone(),
        tx_type: tx.tx_type.clone(),
        status: status.to_string(),
        urgency_level: urgency_level.to_string(),
        time_remaining_ms,
        is_expiring,
        expires_at: tx
            .expires_at
            .map(|t| bson::DateTime::from_millis(t.timestamp_millis())),
        category: eligible.category.as_str().to_string(),
        signatures,
        eligible_signing_paths: eligible.paths.clone(),
        user_has_signed: false,
        discovered_at: Some(bson::DateTime::from_millis(now.timestamp_millis())),
        updated_at: Some(bson::DateTime::from_millis(now.timestamp_millis())),
    }
}

fn build_summary(
    uid: &str,
    docs: &[PendingActionDoc],
    tx_hashes: Vec<String>,
    now: DateTime<Utc>,
) -> InboxSummaryDoc {
    let urgent_count = docs.iter().filter(|d| d.is_expiring).count() as i64;
    let initiated_count = docs
        .iter()
        .filter(|d| d.category == "initiated_by_user")
        .count() as i64;
    let requiring_signature_count = docs.len() as i64 - initiated_count;

    InboxSummaryDoc {
        uid: uid.to_string(),
        count: docs.len() as i64,
        urgent_count,
        initiated_count,
        requiring_signature_count,
        tx_hashes,
        cycle_token: cycle_token(uid),
        computed_at: Some(bson::DateTime::from_millis(now.timestamp_millis())),
    }
}

/// Opaque per-cycle token: `base36(now_ms)_rand8_digest8`. Downstream
/// consumers correlate a summary snapshot to the producing cycle; the
/// token is never parsed.
pub fn cycle_token(uid: &str) -> String {
    let now_ms = Utc::now().timestamp_millis().max(0) as u128;

    let rand8: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();

    let digest = Sha256::digest(uid.as_bytes());
    let digest_hex: String = digest.iter().fold(String::new(), |mut acc, byte| {
        acc.push_str(&format!("{byte:02x}"));
        acc
    });

    format!("{}_{}_{}", to_base36(now_ms), rand8, &digest_hex[..8])
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
