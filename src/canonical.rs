//! Canonical forms for ledger URLs and transaction hashes
//!
//! Every URL and hash that crosses a module boundary is normalized here
//! first; equality anywhere else in the crate is byte equality of the
//! canonical form.

/// Normalize a ledger URL: trim, lowercase, ensure the `acc://` scheme,
/// strip trailing slashes.
///
/// Accepts `acc:foo.acme`, `FOO.acme/`, and full `acc://foo.acme` forms.
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() {
        return trimmed;
    }

    let mut url = if trimmed.starts_with("acc://") {
        trimmed
    } else if let Some(rest) = trimmed.strip_prefix("acc:") {
        format!("acc://{}", rest.trim_start_matches('/'))
    } else {
        format!("acc://{trimmed}")
    };

    while url.len() > "acc://".len() && url.ends_with('/') {
        url.pop();
    }
    url
}

/// Normalize a transaction hash to bare lowercase hex.
///
/// Strips a `0x` or `acc://` prefix and truncates at the first `@` or `/`,
/// which reduces the ledger's `acc://HEX@principal/path` transaction-id
/// form to `HEX`. Empty input yields empty output.
pub fn normalize_hash(input: &str) -> String {
    let mut hash = input.trim().to_lowercase();
    if let Some(rest) = hash.strip_prefix("0x") {
        hash = rest.to_string();
    }
    if let Some(rest) = hash.strip_prefix("acc://") {
        hash = rest.to_string();
    }
    if let Some(cut) = hash.find(['@', '/']) {
        hash.truncate(cut);
    }
    hash
}

/// Extract the identity (ADI) root from a ledger URL.
///
/// `acc://foo.acme/book/1` becomes `acc://foo.acme`; an identity URL is
/// returned unchanged.
pub fn extract_adi(url: &str) -> String {
    let canonical = normalize_url(url);
    let Some(rest) = canonical.strip_prefix("acc://") else {
        return canonical;
    };
    match rest.find('/') {
        Some(cut) => format!("acc://{}", &rest[..cut]),
        None => canonical,
    }
}

/// Advisory check for a key-book URL (`…/book` or `…/books`).
///
/// The ledger account `type` field is authoritative; this only guides
/// which directory entries are worth querying.
pub fn is_key_book_url(url: &str) -> bool {
    let canonical = normalize_url(url);
    let Some(rest) = canonical.strip_prefix("acc://") else {
        return false;
    };
    match rest.rsplit_once('/') {
        Some((_, last)) => last == "book" || last == "books",
        None => false,
    }
}

/// Advisory check for a key-page URL (`…/book/N`, `…/books/N`, `…/page/N`).
pub fn is_key_page_url(url: &str) -> bool {
    let canonical = normalize_url(url);
    let Some(rest) = canonical.strip_prefix("acc://") else {
        return false;
    };
    let mut segments = rest.rsplit('/');
    let last = segments.next().unwrap_or("");
    let parent = segments.next().unwrap_or("");
    if last.is_empty() || !last.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    parent == "book" || parent == "books" || parent == "page"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url_forms() {
        assert_eq!(normalize_url("ACC://FOO.ACME/"), "acc://foo.acme");
        assert_eq!(normalize_url("foo.acme"), "acc://foo.acme");
        assert_eq!(normalize_url("acc:foo.acme/book"), "acc://foo.acme/book");
        assert_eq!(normalize_url("  acc://a.acme/book/1  "), "acc://a.acme/book/1");
        assert_eq!(normalize_url(""), "");
    }

    #[test]
    fn test_normalize_url_idempotent() {
        for input in ["ACC://Foo.Acme/Book/1/", "bar.acme", "acc:x.acme"] {
            let once = normalize_url(input);
            assert_eq!(normalize_url(&once), once);
        }
    }

    #[test]
    fn test_normalize_hash_forms() {
        assert_eq!(normalize_hash("0xABCD@acc://x/y"), "abcd");
        assert_eq!(normalize_hash("acc://DEADBEEF@foo.acme"), "deadbeef");
        assert_eq!(normalize_hash("abc123/extra"), "abc123");
        assert_eq!(normalize_hash("  FFEE  "), "ffee");
        assert_eq!(normalize_hash(""), "");
    }

    #[test]
    fn test_normalize_hash_idempotent() {
        for input in ["0xAbCd@acc://x", "acc://1234@p/q", "beef"] {
            let once = normalize_hash(input);
            assert_eq!(normalize_hash(&once), once);
        }
    }

    #[test]
    fn test_extract_adi() {
        assert_eq!(extract_adi("acc://foo.acme/book/1"), "acc://foo.acme");
        assert_eq!(extract_adi("acc://foo.acme"), "acc://foo.acme");
        assert_eq!(extract_adi("ACC://Bar.Acme/tokens"), "acc://bar.acme");
    }

    #[test]
    fn test_key_book_predicate() {
        assert!(is_key_book_url("acc://foo.acme/book"));
        assert!(is_key_book_url("acc://foo.acme/books"));
        assert!(!is_key_book_url("acc://foo.acme/book/1"));
        assert!(!is_key_book_url("acc://foo.acme"));
        assert!(!is_key_book_url("acc://foo.acme/tokens"));
    }

    #[test]
    fn test_key_page_predicate() {
        assert!(is_key_page_url("acc://foo.acme/book/1"));
        assert!(is_key_page_url("acc://foo.acme/books/12"));
        assert!(is_key_page_url("acc://foo.acme/page/3"));
        assert!(!is_key_page_url("acc://foo.acme/book"));
        assert!(!is_key_page_url("acc://foo.acme/book/x"));
        assert!(!is_key_page_url("acc://foo.acme"));
    }
}
