// IndicatorStore - moderation state machine and feed materialization.
//
// Submission: clean -> (detect type) -> hash -> insert-or-touch.
// Moderation: any status to any status, admin only (enforced by the caller's
// authorization gate, not here).
// Feed: enabled indicators inside a time window, digests only.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::detect::detect_type;
use super::normalize::{clean, hash, is_digest};
use crate::db::models::{Indicator, IndicatorKind, IndicatorStatus, WriteOutcome};
use crate::db::Database;
use crate::error::{NodeError, Result};

/// Time-bounded view over the indicator set, measured against `updated_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedWindow {
    AllTime,
    SixMonths,
    Day,
}

impl FeedWindow {
    /// Lower bound of the window relative to `now`, or None for all-time.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            FeedWindow::AllTime => None,
            FeedWindow::SixMonths => Some(now - Duration::days(182)),
            FeedWindow::Day => Some(now - Duration::hours(24)),
        }
    }
}

/// One batch of indicators from one submitter.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Explicit type for the whole batch; required for pre-hashed values.
    pub kind: Option<IndicatorKind>,
    pub values: Vec<String>,
    pub tags: Vec<String>,
    pub owner: String,
    /// False marks the batch as not yet approved (status `pending`).
    pub enabled: bool,
}

/// Per-item outcome counts of a batch submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AddSummary {
    /// Newly inserted records.
    pub added: usize,
    /// Already-known indicators whose timestamp was refreshed.
    pub touched: usize,
    /// Items that could not be turned into an indicator.
    pub skipped: usize,
    /// Items the store failed to write.
    pub failed: usize,
}

/// The consumer-facing feed: digests grouped by type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub emails: Vec<String>,
    pub domains: Vec<String>,
}

impl Feed {
    fn from_indicators(indicators: Vec<Indicator>) -> Self {
        let mut feed = Feed::default();
        for ioc in indicators {
            match ioc.kind {
                IndicatorKind::Email => feed.emails.push(ioc.hashed),
                IndicatorKind::Domain => feed.domains.push(ioc.hashed),
            }
        }
        feed
    }
}

/// Turn one submitted value into a record ready for insertion.
///
/// A digest-shaped value is taken as pre-hashed: the cleartext stays empty and
/// the type must come from the submitter, since it can't be recovered.
pub fn build_indicator(
    raw: &str,
    kind: Option<IndicatorKind>,
    tags: &BTreeSet<String>,
    owner: &str,
    status: IndicatorStatus,
    now: DateTime<Utc>,
) -> Result<Indicator> {
    let (original, hashed, kind) = if is_digest(raw) {
        let kind = kind.ok_or_else(|| {
            NodeError::InvalidRequest("pre-hashed indicators need an explicit type".to_string())
        })?;
        (String::new(), raw.trim().to_lowercase(), kind)
    } else {
        let original = clean(raw);
        if original.is_empty() {
            return Err(NodeError::InvalidRequest("empty indicator".to_string()));
        }
        let kind = match kind {
            Some(kind) => kind,
            None => detect_type(&original)?,
        };
        let hashed = hash(&original);
        (original, hashed, kind)
    };

    Ok(Indicator {
        kind,
        original,
        hashed,
        tags: tags.clone(),
        created_at: now,
        updated_at: now,
        owner: owner.to_string(),
        status,
    })
}

fn normalize_tags(tags: &[String]) -> BTreeSet<String> {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct IndicatorStore {
    db: Arc<dyn Database>,
}

impl IndicatorStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Add a batch of indicators, best effort per item.
    ///
    /// A known indicator is touched (timestamp refreshed, nothing else
    /// changed) and counts as a success, not as an addition.
    pub async fn add(&self, submission: &Submission) -> AddSummary {
        let tags = normalize_tags(&submission.tags);
        let status = if submission.enabled {
            IndicatorStatus::Enabled
        } else {
            IndicatorStatus::Pending
        };

        let mut summary = AddSummary::default();
        for raw in &submission.values {
            let ioc = match build_indicator(
                raw,
                submission.kind,
                &tags,
                &submission.owner,
                status,
                Utc::now(),
            ) {
                Ok(ioc) => ioc,
                Err(e) => {
                    warn!(indicator = %raw, error = %e, "Skipping indicator");
                    summary.skipped += 1;
                    continue;
                }
            };

            match self.db.insert_or_touch_indicator(&ioc).await {
                Ok(WriteOutcome::Inserted) => {
                    debug!(hash = %ioc.hashed, kind = %ioc.kind, status = %ioc.status, "Added indicator");
                    summary.added += 1;
                }
                Ok(WriteOutcome::Existed) => {
                    debug!(hash = %ioc.hashed, "Indicator already known, touched");
                    summary.touched += 1;
                }
                Err(e) => {
                    warn!(hash = %ioc.hashed, error = %e, "Failed to add indicator to database");
                    summary.failed += 1;
                }
            }
        }

        info!(
            owner = %submission.owner,
            added = summary.added,
            touched = summary.touched,
            skipped = summary.skipped,
            failed = summary.failed,
            "Processed indicator submission"
        );
        summary
    }

    /// Move one indicator to `status` and refresh its timestamp.
    pub async fn set_status(&self, hashed: &str, status: IndicatorStatus) -> Result<()> {
        let hashed = hashed.trim().to_lowercase();
        if self
            .db
            .set_indicator_status(&hashed, status, Utc::now())
            .await?
        {
            info!(hash = %hashed, status = %status, "Changed indicator status");
            Ok(())
        } else {
            Err(NodeError::NotFound(format!("indicator {hashed}")))
        }
    }

    /// Bulk form of `set_status`. Unknown hashes are skipped; store failures
    /// abort. Returns how many indicators were toggled.
    pub async fn set_status_many(&self, hashes: &[String], status: IndicatorStatus) -> Result<usize> {
        let mut toggled = 0;
        for hashed in hashes {
            match self.set_status(hashed, status).await {
                Ok(()) => toggled += 1,
                Err(NodeError::NotFound(_)) => {
                    warn!(hash = %hashed, "Cannot change status of unknown indicator");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(toggled)
    }

    /// Full records inside `window`, optionally limited to one status.
    pub async fn fetch(
        &self,
        window: FeedWindow,
        status: Option<IndicatorStatus>,
    ) -> Result<Vec<Indicator>> {
        let since = window.since(Utc::now());
        Ok(self.db.list_indicators(since, status).await?)
    }

    /// Enabled digests inside `window`, grouped by type. Never carries
    /// cleartext.
    pub async fn feed(&self, window: FeedWindow) -> Result<Feed> {
        let indicators = self.fetch(window, Some(IndicatorStatus::Enabled)).await?;
        Ok(Feed::from_indicators(indicators))
    }

    /// Full record for one hash, cleartext included.
    pub async fn details(&self, hashed: &str) -> Result<Indicator> {
        let hashed = hashed.trim().to_lowercase();
        self.db
            .get_indicator(&hashed)
            .await?
            .ok_or_else(|| NodeError::NotFound(format!("indicator {hashed}")))
    }
}
