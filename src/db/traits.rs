// Database trait - backend-agnostic async interface for all DB operations.
//
// Implementors: SqliteDatabase (wraps rusqlite), PgDatabase (wraps sqlx).
// All methods are async so both sync (rusqlite via Mutex) and native async
// (sqlx) backends fit behind a single interface. Components receive an
// `Arc<dyn Database>` at construction; nothing reaches for a global handle.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{Alert, Indicator, IndicatorKind, IndicatorStatus, Review, User, WriteOutcome};

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Indicators ---

    /// Insert the indicator, or, when a row with the same `hashed` value
    /// exists, refresh only its `updated_at` to `indicator.updated_at`.
    /// Must be a single atomic operation in the backend.
    async fn insert_or_touch_indicator(&self, indicator: &Indicator) -> Result<WriteOutcome>;

    /// Look up an indicator by its hash.
    async fn get_indicator(&self, hashed: &str) -> Result<Option<Indicator>>;

    /// Overwrite an indicator's status and refresh `updated_at`.
    /// Returns false when no indicator has this hash.
    async fn set_indicator_status(
        &self,
        hashed: &str,
        status: IndicatorStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// List indicators updated at or after `since` (all when None),
    /// optionally restricted to one status, newest first.
    async fn list_indicators(
        &self,
        since: Option<DateTime<Utc>>,
        status: Option<IndicatorStatus>,
    ) -> Result<Vec<Indicator>>;

    /// The subset of `candidates` that are hashes of indicators of `kind` in
    /// `status`, read in one query.
    async fn matching_hashes(
        &self,
        kind: IndicatorKind,
        status: IndicatorStatus,
        candidates: &[String],
    ) -> Result<Vec<String>>;

    // --- Users ---

    /// Insert a user unless the (lower-cased) email is already taken.
    async fn insert_user(&self, user: &User) -> Result<WriteOutcome>;

    /// Case-insensitive lookup by API key.
    async fn get_user_by_key(&self, key: &str) -> Result<Option<User>>;

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>>;

    /// All users, oldest first.
    async fn list_users(&self) -> Result<Vec<User>>;

    /// Set the activation flag. Returns false when no user has this id.
    async fn set_user_activated(&self, id: &str, activated: bool) -> Result<bool>;

    // --- Reviews ---

    async fn insert_review(&self, review: &Review) -> Result<()>;

    /// All review requests, newest first.
    async fn list_reviews(&self) -> Result<Vec<Review>>;

    /// Review requests filed against one indicator hash, newest first.
    async fn list_reviews_for(&self, indicator: &str) -> Result<Vec<Review>>;

    // --- Alerts ---

    async fn insert_alert(&self, alert: &Alert) -> Result<()>;

    /// Alerts newest first, skipping `offset` rows and returning at most
    /// `limit` (all remaining when None).
    async fn list_alerts(&self, offset: u64, limit: Option<u64>) -> Result<Vec<Alert>>;
}
