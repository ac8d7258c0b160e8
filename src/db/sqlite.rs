// SqliteDatabase - rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Send.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{Alert, Indicator, IndicatorKind, IndicatorStatus, Review, User, WriteOutcome};
use super::queries;
use super::traits::Database;

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// A fresh in-memory database with all tables created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        super::schema::create_tables(&conn)?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn insert_or_touch_indicator(&self, indicator: &Indicator) -> Result<WriteOutcome> {
        let conn = self.conn.lock().await;
        queries::insert_or_touch_indicator(&conn, indicator)
    }

    async fn get_indicator(&self, hashed: &str) -> Result<Option<Indicator>> {
        let conn = self.conn.lock().await;
        queries::get_indicator(&conn, hashed)
    }

    async fn set_indicator_status(
        &self,
        hashed: &str,
        status: IndicatorStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::set_indicator_status(&conn, hashed, status, &at)
    }

    async fn list_indicators(
        &self,
        since: Option<DateTime<Utc>>,
        status: Option<IndicatorStatus>,
    ) -> Result<Vec<Indicator>> {
        let conn = self.conn.lock().await;
        queries::list_indicators(&conn, since.as_ref(), status)
    }

    async fn matching_hashes(
        &self,
        kind: IndicatorKind,
        status: IndicatorStatus,
        candidates: &[String],
    ) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        queries::matching_hashes(&conn, kind, status, candidates)
    }

    async fn insert_user(&self, user: &User) -> Result<WriteOutcome> {
        let conn = self.conn.lock().await;
        queries::insert_user(&conn, user)
    }

    async fn get_user_by_key(&self, key: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        queries::get_user_by_key(&conn, key)
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        queries::get_user_by_id(&conn, id)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock().await;
        queries::list_users(&conn)
    }

    async fn set_user_activated(&self, id: &str, activated: bool) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::set_user_activated(&conn, id, activated)
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_review(&conn, review)
    }

    async fn list_reviews(&self) -> Result<Vec<Review>> {
        let conn = self.conn.lock().await;
        queries::list_reviews(&conn)
    }

    async fn list_reviews_for(&self, indicator: &str) -> Result<Vec<Review>> {
        let conn = self.conn.lock().await;
        queries::list_reviews_for(&conn, indicator)
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_alert(&conn, alert)
    }

    async fn list_alerts(&self, offset: u64, limit: Option<u64>) -> Result<Vec<Alert>> {
        let conn = self.conn.lock().await;
        queries::list_alerts(&conn, offset, limit)
    }
}
