// AlertDesk - client reports of feed matches.
//
// A client that finds something it encountered on the feed (a visited URL, a
// sender address) reports it here so administrators can see where the feed
// is firing. Alerts are append-only.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::db::models::Alert;
use crate::db::Database;
use crate::error::{NodeError, Result};

/// What a client sends when it reports a match.
#[derive(Debug, Clone)]
pub struct AlertReport {
    pub kind: String,
    pub matched: String,
    pub indicator: String,
}

pub struct AlertDesk {
    db: Arc<dyn Database>,
}

impl AlertDesk {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Record an alert on behalf of `user_id` (None for anonymous callers on
    /// an open node).
    pub async fn report(&self, report: AlertReport, user_id: Option<&str>) -> Result<Alert> {
        let kind = report.kind.trim().to_lowercase();
        if kind.is_empty() {
            return Err(NodeError::InvalidRequest("alert type must not be empty".to_string()));
        }
        let indicator = report.indicator.trim().to_lowercase();
        if indicator.is_empty() {
            return Err(NodeError::InvalidRequest(
                "alert indicator must not be empty".to_string(),
            ));
        }

        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            kind,
            matched: report.matched.trim().to_string(),
            indicator,
            user_id: user_id.map(str::to_string),
            created_at: Utc::now(),
        };
        self.db.insert_alert(&alert).await?;
        info!(id = %alert.id, kind = %alert.kind, indicator = %alert.indicator, "Alert reported");
        Ok(alert)
    }

    /// Newest first. A `limit` of zero means no limit.
    pub async fn list(&self, offset: u64, limit: u64) -> Result<Vec<Alert>> {
        let limit = (limit > 0).then_some(limit);
        Ok(self.db.list_alerts(offset, limit).await?)
    }
}
