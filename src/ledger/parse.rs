//! Tolerant parsing of ledger query responses
//!
//! The ledger's v3 envelope varies by method, version, and record type;
//! the same datum can appear at several structural locations. All of the
//! probing lives here so the rest of the crate sees typed values. Schema
//! surprises degrade to empty/None with a log line; they never abort a
//! discovery cycle.

use serde_json::Value;
use tracing::{debug, warn};

use super::types::{KeyEntry, KeyPage, PendingTx, SignatureRecord, TxStatus, Vote};
use crate::canonical::{normalize_hash, normalize_url};

// =============================================================================
// Range-shaped responses (pending, directory, chain)
// =============================================================================

/// Pull the record array and total count out of a range-shaped response.
///
/// Records may sit at `records` (when `recordType == "range"` or always,
/// depending on server version) or at `items`.
pub fn range_records(result: &Value) -> (Vec<Value>, Option<u64>) {
    let total = result.get("total").and_then(Value::as_u64);

    if let Some(records) = result.get("records").and_then(Value::as_array) {
        return (records.clone(), total);
    }
    if let Some(items) = result.get("items").and_then(Value::as_array) {
        return (items.clone(), total);
    }
    (Vec::new(), total)
}

/// Records of a pending query: `pending.records` takes precedence over
/// the generic range locations.
pub fn pending_records(result: &Value) -> (Vec<Value>, Option<u64>) {
    if let Some(pending) = result.get("pending") {
        if let Some(records) = pending.get("records").and_then(Value::as_array) {
            let total = pending.get("total").and_then(Value::as_u64);
            return (records.clone(), total);
        }
    }
    range_records(result)
}

/// Extract a transaction id from one pending-range record.
///
/// Probes, in order: `value` as a string; `value.{txID,txId,id}`;
/// `value.message.txID`; `txid`/`hash` on the record; a bare `acc://`
/// string record.
pub fn record_tx_id(record: &Value) -> Option<String> {
    if let Some(value) = record.get("value") {
        if let Some(s) = value.as_str() {
            return Some(s.to_string());
        }
        for key in ["txID", "txId", "id"] {
            if let Some(s) = value.get(key).and_then(Value::as_str) {
                return Some(s.to_string());
            }
        }
        if let Some(s) = value
            .get("message")
            .and_then(|m| m.get("txID"))
            .and_then(Value::as_str)
        {
            return Some(s.to_string());
        }
    }
    for key in ["txid", "hash"] {
        if let Some(s) = record.get(key).and_then(Value::as_str) {
            return Some(s.to_string());
        }
    }
    if let Some(s) = record.as_str() {
        if s.starts_with("acc://") {
            return Some(s.to_string());
        }
    }
    None
}

/// Extract the account URL from one directory record. Unknown shapes are
/// skipped with a warning.
pub fn directory_entry_url(record: &Value) -> Option<String> {
    if let Some(s) = record.as_str() {
        return Some(normalize_url(s));
    }
    if let Some(s) = record.get("value").and_then(Value::as_str) {
        return Some(normalize_url(s));
    }
    if let Some(s) = record.get("url").and_then(Value::as_str) {
        return Some(normalize_url(s));
    }
    if let Some(s) = record
        .get("account")
        .and_then(|a| a.get("url"))
        .and_then(Value::as_str)
    {
        return Some(normalize_url(s));
    }
    warn!(record = %record, "unrecognized directory record shape, skipping");
    None
}

// =============================================================================
// Accounts: key books and key pages
// =============================================================================

/// The account object of an account query, wherever it landed.
fn account_container(result: &Value) -> &Value {
    for key in ["account", "data"] {
        if let Some(container) = result.get(key) {
            if container.is_object() {
                return container;
            }
        }
    }
    result
}

/// Page count of a key book; 0 when the account is not a key book or the
/// field is absent.
pub fn parse_page_count(result: &Value) -> u64 {
    let account = account_container(result);
    if let Some(ty) = account.get("type").and_then(Value::as_str) {
        if !ty.eq_ignore_ascii_case("keybook") {
            return 0;
        }
    }
    account
        .get("pageCount")
        .or_else(|| result.get("pageCount"))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Build a typed key page from an account query; None unless the account
/// type is `keyPage`.
pub fn parse_key_page(url: &str, result: &Value) -> Option<KeyPage> {
    let account = account_container(result);
    let ty = account.get("type").and_then(Value::as_str)?;
    if !ty.eq_ignore_ascii_case("keypage") {
        return None;
    }

    let mut entries = Vec::new();
    if let Some(keys) = account.get("keys").and_then(Value::as_array) {
        for raw in keys {
            if let Some(delegate) = raw.get("delegate").and_then(Value::as_str) {
                entries.push(KeyEntry::Delegate {
                    url: normalize_url(delegate),
                });
            } else if let Some(hash) = raw.get("publicKeyHash").and_then(Value::as_str) {
                entries.push(KeyEntry::Key {
                    public_key_hash: normalize_hash(hash),
                });
            } else {
                debug!(page = %url, entry = %raw, "skipping unrecognized key entry");
            }
        }
    }

    let threshold = account
        .get("acceptThreshold")
        .or_else(|| account.get("threshold"))
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;

    Some(KeyPage {
        url: normalize_url(url),
        version: account.get("version").and_then(Value::as_u64).unwrap_or(0),
        threshold,
        credit_balance: account
            .get("creditBalance")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        entries,
    })
}

// =============================================================================
// Transaction status
// =============================================================================

/// Interpret the polymorphic `status` field: a bare string, a map with a
/// numeric or string `code`, or a map with boolean `pending`/`delivered`
/// flags.
pub fn parse_status_v3(status: Option<&Value>) -> TxStatus {
    let Some(status) = status else {
        return TxStatus::Unknown;
    };

    if let Some(s) = status.as_str() {
        return status_from_name(s);
    }

    if let Some(code) = status.get("code") {
        if let Some(n) = code.as_u64() {
            return match n {
                202 => TxStatus::Pending,
                201 => TxStatus::Delivered,
                _ => TxStatus::Unknown,
            };
        }
        if let Some(s) = code.as_str() {
            return status_from_name(s);
        }
    }

    if status.get("pending").and_then(Value::as_bool) == Some(true) {
        return TxStatus::Pending;
    }
    if status.get("delivered").and_then(Value::as_bool) == Some(true) {
        return TxStatus::Delivered;
    }
    TxStatus::Unknown
}

fn status_from_name(name: &str) -> TxStatus {
    match name.to_lowercase().as_str() {
        "pending" => TxStatus::Pending,
        "delivered" => TxStatus::Delivered,
        "remote" => TxStatus::Remote,
        "failed" => TxStatus::Failed,
        "expired" => TxStatus::Expired,
        _ => TxStatus::Unknown,
    }
}

/// Status of a raw transaction response.
pub fn transaction_status(result: &Value) -> TxStatus {
    parse_status_v3(result.get("status"))
}

// =============================================================================
// Signatures
// =============================================================================

/// Collect every signature on a transaction response.
///
/// Three envelope generations are probed and merged: the nested v3 form
/// (`signatures.records[].signatures.records[].message`), the paginated
/// form (`signatureBooks[].pages[].signatures`), and the flat legacy
/// array. Duplicates are collapsed by (signer, key hash, timestamp).
pub fn extract_signatures_v3(result: &Value) -> Vec<SignatureRecord> {
    let mut records = Vec::new();

    // Nested: signatures is an object holding per-signer record sets.
    if let Some(sets) = result
        .get("signatures")
        .and_then(|s| s.get("records"))
        .and_then(Value::as_array)
    {
        for set in sets {
            if let Some(inner) = set
                .get("signatures")
                .and_then(|s| s.get("records"))
                .and_then(Value::as_array)
            {
                for entry in inner {
                    if let Some(message) = entry.get("message") {
                        if message.get("type").and_then(Value::as_str) == Some("signature") {
                            if let Some(sig) = message.get("signature") {
                                if let Some(record) = signature_from_object(sig, None) {
                                    records.push(record);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    // Paginated: signatureBooks[].pages[].signatures, array or {records}.
    if let Some(books) = result.get("signatureBooks").and_then(Value::as_array) {
        for book in books {
            let Some(pages) = book.get("pages").and_then(Value::as_array) else {
                continue;
            };
            for page in pages {
                let entries = match page.get("signatures") {
                    Some(Value::Array(a)) => a.clone(),
                    Some(obj) => obj
                        .get("records")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default(),
                    None => Vec::new(),
                };
                for entry in &entries {
                    let sig = entry
                        .get("message")
                        .and_then(|m| m.get("signature"))
                        .or_else(|| entry.get("signature"))
                        .unwrap_or(entry);
                    if let Some(record) = signature_from_object(sig, None) {
                        records.push(record);
                    }
                }
            }
        }
    }

    // Flat legacy: signatures is an array of signer sets.
    if let Some(sets) = result.get("signatures").and_then(Value::as_array) {
        for set in sets {
            let outer_signer = set.get("signer").and_then(signer_url);
            if let Some(inner) = set.get("signatures").and_then(Value::as_array) {
                for sig in inner {
                    if let Some(record) = signature_from_object(sig, outer_signer.as_deref()) {
                        records.push(record);
                    }
                }
            } else if let Some(record) = signature_from_object(set, outer_signer.as_deref()) {
                records.push(record);
            }
        }
    }

    dedup_signatures(records)
}

/// The signer reference can be a bare URL string or `{url}`.
fn signer_url(value: &Value) -> Option<String> {
    if let Some(s) = value.as_str() {
        return Some(normalize_url(s));
    }
    value
        .get("url")
        .and_then(Value::as_str)
        .map(normalize_url)
}

/// Delegated signatures wrap the real one: keep descending into
/// `.signature` until a signer shows up, then read fields from that
/// innermost object.
fn innermost_signature(sig: &Value) -> &Value {
    let mut current = sig;
    loop {
        if current.get("signer").map(|s| signer_url(s).is_some()) == Some(true) {
            return current;
        }
        match current.get("signature") {
            Some(inner) if inner.is_object() => current = inner,
            _ => return current,
        }
    }
}

fn signature_from_object(sig: &Value, fallback_signer: Option<&str>) -> Option<SignatureRecord> {
    let sig = innermost_signature(sig);

    let signer = sig
        .get("signer")
        .and_then(signer_url)
        .or_else(|| fallback_signer.map(normalize_url))?;

    let public_key_hash = sig
        .get("publicKeyHash")
        .and_then(Value::as_str)
        .map(normalize_hash)
        .unwrap_or_default();

    let vote = match sig.get("vote").and_then(Value::as_str) {
        Some(v) if v.eq_ignore_ascii_case("reject") => Vote::Reject,
        Some(v) if v.eq_ignore_ascii_case("abstain") => Vote::Abstain,
        _ => Vote::Approve,
    };

    let timestamp_ms = sig
        .get("timestamp")
        .and_then(Value::as_i64)
        .map(scale_timestamp_ms)
        .unwrap_or(0);

    Some(SignatureRecord {
        signer,
        public_key_hash,
        vote,
        timestamp_ms,
    })
}

/// v3 timestamps are microseconds (> 10^15), legacy ones seconds
/// (< 10^12); normalize everything to milliseconds.
fn scale_timestamp_ms(raw: i64) -> i64 {
    if raw > 1_000_000_000_000_000 {
        raw / 1_000
    } else if raw > 0 && raw < 1_000_000_000_000 {
        raw * 1_000
    } else {
        raw
    }
}

fn dedup_signatures(records: Vec<SignatureRecord>) -> Vec<SignatureRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert((r.signer.clone(), r.public_key_hash.clone(), r.timestamp_ms)))
        .collect()
}

// =============================================================================
// Transactions
// =============================================================================

/// Build a `PendingTx` from a `{txid}` query response. The transaction
/// object may sit at `transaction` or `message.transaction`.
pub fn parse_transaction(tx_id: &str, result: &Value) -> Option<PendingTx> {
    let txn = result
        .get("transaction")
        .or_else(|| result.get("message").and_then(|m| m.get("transaction")))?;

    let header = txn.get("header").cloned().unwrap_or(Value::Null);
    let body = txn.get("body").cloned().unwrap_or(Value::Null);

    let reported_id = result
        .get("txid")
        .and_then(Value::as_str)
        .unwrap_or(tx_id)
        .to_string();

    let principal = header
        .get("principal")
        .and_then(Value::as_str)
        .map(normalize_url)
        .unwrap_or_default();

    let tx_type = body
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    Some(PendingTx {
        hash: normalize_hash(&reported_id),
        tx_id: reported_id,
        principal,
        tx_type,
        status: transaction_status(result),
        signatures: extract_signatures_v3(result),
        expires_at: parse_expiry(&header),
        body,
    })
}

/// Expiry from the transaction header, as either an RFC 3339 string or a
/// numeric timestamp at `expire.atTime`.
fn parse_expiry(header: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    let at_time = header.get("expire").and_then(|e| e.get("atTime"))?;

    if let Some(s) = at_time.as_str() {
        return chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&chrono::Utc));
    }
    at_time
        .as_i64()
        .map(scale_timestamp_ms)
        .and_then(chrono::DateTime::from_timestamp_millis)
}
