// BlocklistMatcher - blocklist lookup offered to the phishing-analysis engine.
//
// A target (bare domain or URL) is reduced to its host and its registrable
// domain; both are cleaned and hashed, then tested against the enabled domain
// indicators. Only hashes are compared, so a pre-hashed indicator matches as
// well as one submitted in cleartext.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use url::Url;

use super::normalize::{clean, hash};
use crate::db::models::{IndicatorKind, IndicatorStatus};
use crate::db::Database;
use crate::error::Result;

pub const BLOCKLIST_SCORE: u8 = 100;

/// Outcome of one blocklist check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub score: u8,
    pub name: String,
    pub description: String,
    /// Digest of the indicator that matched.
    pub matched: Option<String>,
}

impl Verdict {
    fn blocklisted(matched: String) -> Self {
        Self {
            score: BLOCKLIST_SCORE,
            name: "blocklisted".to_string(),
            description: "The domain was found on the indicator blocklist".to_string(),
            matched: Some(matched),
        }
    }

    fn neutral() -> Self {
        Self {
            score: 0,
            name: "blocklist".to_string(),
            description: "The domain is not on the indicator blocklist".to_string(),
            matched: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}

/// Host and registrable domain (eTLD+1) of a target, both cleaned.
///
/// Returns None when the target has no parseable host.
pub fn target_domains(target: &str) -> Option<(String, Option<String>)> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    let parsed = if target.contains("://") {
        Url::parse(target).ok()?
    } else {
        Url::parse(&format!("http://{target}")).ok()?
    };
    let host = clean(parsed.host_str()?);
    if host.is_empty() {
        return None;
    }
    let registrable = psl::domain_str(&host).map(clean);
    Some((host, registrable))
}

pub struct BlocklistMatcher {
    db: Arc<dyn Database>,
}

impl BlocklistMatcher {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Check `target` against the enabled domain indicators.
    ///
    /// Both candidate digests are tested in one store query, so a concurrent
    /// moderation change is either fully visible or not at all.
    pub async fn is_blocked(&self, target: &str) -> Result<Verdict> {
        let Some((host, registrable)) = target_domains(target) else {
            debug!(target = %target, "Blocklist target has no host");
            return Ok(Verdict::neutral());
        };

        let candidates: Vec<(String, String)> = std::iter::once(host)
            .chain(registrable)
            .map(|domain| {
                let digest = hash(&domain);
                (domain, digest)
            })
            .collect();
        let digests: Vec<String> = candidates.iter().map(|(_, d)| d.clone()).collect();

        let enabled: HashSet<String> = self
            .db
            .matching_hashes(IndicatorKind::Domain, IndicatorStatus::Enabled, &digests)
            .await?
            .into_iter()
            .collect();

        // Host first, then the registrable domain.
        for (domain, digest) in candidates {
            if enabled.contains(&digest) {
                debug!(target = %target, domain = %domain, "Blocklist match");
                return Ok(Verdict::blocklisted(digest));
            }
        }

        Ok(Verdict::neutral())
    }
}
