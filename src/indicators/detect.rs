// Indicator type detection.
//
// Only used when a submitter didn't say what kind of indicator they sent.
// Email is checked before domain; no string passes both checks because a
// domain name never contains '@'.

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::db::models::IndicatorKind;
use crate::error::{NodeError, Result};

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;
const MAX_LOCAL_PART_LEN: usize = 64;

/// Classify a cleaned indicator as an email address or a domain name.
pub fn detect_type(cleaned: &str) -> Result<IndicatorKind> {
    if is_email(cleaned) {
        Ok(IndicatorKind::Email)
    } else if is_domain(cleaned) {
        Ok(IndicatorKind::Domain)
    } else {
        Err(NodeError::UnrecognizedIndicatorFormat(cleaned.to_string()))
    }
}

/// Syntactic email check: one '@', a dot-atom local part, an FQDN after it.
pub fn is_email(value: &str) -> bool {
    static LOCAL_RE: OnceLock<Regex> = OnceLock::new();
    let local_re = LOCAL_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*$")
            .expect("valid local-part regex")
    });

    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if domain.contains('@') || local.is_empty() || local.len() > MAX_LOCAL_PART_LEN {
        return false;
    }
    local_re.is_match(local) && is_domain(domain)
}

/// Fully-qualified domain name check (no trailing dot, no IP literals).
pub fn is_domain(value: &str) -> bool {
    if value.is_empty() || value.len() > MAX_DOMAIN_LEN {
        return false;
    }

    let labels: Vec<&str> = value.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let valid_labels = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    // The TLD must be alphabetic (or an IDNA "xn--" label), which rules out
    // dotted IPv4 addresses.
    let tld = labels[labels.len() - 1];
    let valid_tld = tld.len() >= 2
        && (tld.chars().all(|c| c.is_ascii_alphabetic()) || tld.starts_with("xn--"));

    valid_labels && valid_tld
}
