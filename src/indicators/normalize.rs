// Indicator normalization and hashing.
//
// Submitters paste indicators straight out of reports, where they are often
// defanged ("evil[.]com", "bad[@]mail.ru"). `clean` undoes that and produces
// the canonical cleartext; `hash` turns the canonical form into the digest
// the feed distributes.

use std::sync::OnceLock;

use regex_lite::Regex;
use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_LEN: usize = 64;

/// Canonicalize a raw indicator string.
///
/// Total and idempotent: `clean(&clean(x)) == clean(x)`.
pub fn clean(raw: &str) -> String {
    // A single pass can expose new patterns ("[\.]" becomes "[.]"), so run
    // to a fixed point. Every pass after the first only shrinks the string.
    let mut value = clean_once(raw);
    loop {
        let next = clean_once(&value);
        if next == value {
            return value;
        }
        value = next;
    }
}

fn clean_once(raw: &str) -> String {
    let value = raw
        .trim()
        .to_lowercase()
        .replace("[@]", "@")
        .replace("[.]", ".")
        .replace("\\@", "@")
        .replace("\\.", ".");

    if !value.contains('@') {
        if let Some(rest) = value.strip_prefix("www.") {
            return rest.to_string();
        }
    }
    value
}

/// SHA-256 of an already-cleaned indicator, lower-case hex.
pub fn hash(cleaned: &str) -> String {
    hex::encode(Sha256::digest(cleaned.as_bytes()))
}

/// True when `value` is exactly a hex SHA-256 digest (either case).
pub fn is_digest(value: &str) -> bool {
    static DIGEST_RE: OnceLock<Regex> = OnceLock::new();
    DIGEST_RE
        .get_or_init(|| Regex::new(r"^[a-fA-F0-9]{64}$").expect("valid digest regex"))
        .is_match(value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_defangs() {
        assert_eq!(clean("bad[@]example[.]com"), "bad@example.com");
        assert_eq!(clean("bad\\@example\\.com"), "bad@example.com");
        assert_eq!(clean("  Evil[.]COM \n"), "evil.com");
    }

    #[test]
    fn test_clean_strips_www_only_for_domains() {
        assert_eq!(clean("WWW.Example.COM"), "example.com");
        assert_eq!(clean("www.bank@example.com"), "www.bank@example.com");
        assert_eq!(clean("wwwexample.com"), "wwwexample.com");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let samples = [
            "WWW.Example.COM",
            "www.www.example.com",
            "evil[.]com",
            "x[@]y[.]z",
            " www[.]example.com ",
            "[.] www.example.com",
            "\\.\\@",
            "[\\.]example.com",
            "",
            "ÄBC.example",
        ];
        for raw in samples {
            let once = clean(raw);
            assert_eq!(clean(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_hash_is_stable_across_variants() {
        let a = hash(&clean("Example.com"));
        let b = hash(&clean("  www.EXAMPLE.com  "));
        let c = hash(&clean("example[.]com"));
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), DIGEST_LEN);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_known_vector() {
        assert_eq!(
            hash("example.com"),
            "a379a6f6eeafb9a55e378c118034e2751e682fab9f2d30ab13d2125586ce1947"
        );
    }

    #[test]
    fn test_is_digest() {
        assert!(is_digest(&"a".repeat(64)));
        assert!(is_digest(&"AbC123".repeat(11).chars().take(64).collect::<String>()));
        assert!(!is_digest(&"a".repeat(63)));
        assert!(!is_digest(&"a".repeat(65)));
        assert!(!is_digest(&format!("x{}", "a".repeat(64))));
        assert!(!is_digest("example.com"));
    }
}
