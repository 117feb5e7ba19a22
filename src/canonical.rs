//! URL canonicalization.
//!
//! Both the crawler and the capture path derive the fallback identity key
//! from the posting URL, independently of each other. The function here must
//! therefore be idempotent: canonicalizing an already-canonical URL returns
//! it unchanged, so the two writers converge on one identity.
//!
//! For Ashby (and Lever) the same job is reachable at both the overview page
//! and its `/application` (`/apply`) sub-route. We store only the overview
//! URL and drop the query string and fragment.

use url::Url;

/// Suffix segments that map an application sub-page back to its listing.
const APPLY_SUFFIXES: &[&str] = &["application", "apply"];

/// Normalize a raw posting URL into the identity key used for dedup.
///
/// On parse failure the input is returned unchanged — identity degrades to
/// literal string equality rather than failing the caller.
pub fn canonicalize_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    parsed.set_query(None);
    parsed.set_fragment(None);

    let mut path = parsed.path().to_string();

    // Strip apply/application suffix segments to a fixed point, so a
    // second canonicalization pass is a no-op.
    loop {
        let trimmed = path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) if APPLY_SUFFIXES.contains(&&trimmed[idx + 1..]) => {
                path = trimmed[..idx].to_string();
            }
            _ => break,
        }
    }

    // Strip one trailing slash, keeping the root path intact.
    while path.ends_with('/') && path != "/" {
        path.pop();
    }
    if path.is_empty() {
        path.push('/');
    }

    parsed.set_path(&path);
    parsed.to_string()
}
