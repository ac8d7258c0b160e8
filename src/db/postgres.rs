// PgDatabase - PostgreSQL backend implementing the Database trait.
//
// Uses sqlx PgPool for native async queries. All queries use runtime
// parameter binding (not compile-time macros) to avoid requiring
// DATABASE_URL at compile time.
//
// Key differences from SQLite:
// - TIMESTAMPTZ instead of TEXT for timestamps
// - JSONB instead of TEXT for tags
// - $1/$2 parameter syntax (handled by sqlx)
// - insert-or-touch is one statement that reports which branch ran

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx_core::pool::Pool;
use sqlx_core::row::Row;
use sqlx_postgres::{PgRow, Postgres};

use super::models::{Alert, Indicator, IndicatorKind, IndicatorStatus, Review, User, WriteOutcome};
use super::traits::Database;

/// Type alias for the PostgreSQL connection pool.
pub type PgPool = Pool<Postgres>;

pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Connect to PostgreSQL and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending migrations.
    ///
    /// A session-level advisory lock keeps two nodes starting together from
    /// applying the same migration twice. The lock and unlock must run on the
    /// same physical connection, so one is held aside for the whole loop. The
    /// unlock always runs; a migration error takes priority when both fail.
    async fn run_migrations(&self) -> Result<()> {
        // ASCII "PHISHNOD" as a big-endian i64.
        const MIGRATION_LOCK_KEY: i64 = 0x5048495348_4E4F44_u64 as i64;

        let mut lock_conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for migration advisory lock")?;

        sqlx_core::query::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to acquire migration advisory lock")?;

        let migration_result: Result<()> = async {
            sqlx_core::query::query(
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
            )
            .execute(&self.pool)
            .await?;

            let migrations = [
                (1, include_str!("../../migrations/postgres/0001_initial.sql")),
                (2, include_str!("../../migrations/postgres/0002_review_index.sql")),
                (3, include_str!("../../migrations/postgres/0003_alerts.sql")),
            ];

            for (version, sql) in migrations {
                let applied: bool = sqlx_core::query::query(
                    "SELECT COUNT(*) > 0 FROM schema_version WHERE version = $1",
                )
                .bind(version)
                .fetch_one(&self.pool)
                .await
                .map(|row| row.get::<bool, _>(0))
                .unwrap_or(false);

                if !applied {
                    // Each migration and its schema_version row commit together.
                    let mut tx = self.pool.begin().await?;
                    sqlx_core::raw_sql::raw_sql(sql).execute(&mut *tx).await?;
                    tx.commit().await?;
                }
            }

            Ok(())
        }
        .await;

        let unlock_result = sqlx_core::query::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to release migration advisory lock");

        migration_result?;
        unlock_result?;

        Ok(())
    }
}

const INDICATOR_COLUMNS: &str =
    "hashed, kind, original, tags, owner, status, created_at, updated_at";

fn indicator_from_row(row: &PgRow) -> Result<Indicator> {
    let kind: String = row.get(1);
    let tags: serde_json::Value = row.get(3);
    let tags: BTreeSet<String> = serde_json::from_value(tags)?;
    let status: String = row.get(5);
    Ok(Indicator {
        hashed: row.get(0),
        kind: kind.parse()?,
        original: row.get(2),
        tags,
        owner: row.get(4),
        status: status.parse()?,
        created_at: row.get(6),
        updated_at: row.get(7),
    })
}

const USER_COLUMNS: &str = "id, name, email, api_key, role, activated, created_at";

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.get(4);
    Ok(User {
        id: row.get(0),
        name: row.get(1),
        email: row.get(2),
        key: row.get(3),
        role: role.parse()?,
        activated: row.get(5),
        created_at: row.get(6),
    })
}

fn review_from_row(row: &PgRow) -> Review {
    Review {
        id: row.get(0),
        indicator: row.get(1),
        requested_by: row.get(2),
        created_at: row.get(3),
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn table_count(&self) -> Result<i64> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*)::bigint FROM information_schema.tables
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn insert_or_touch_indicator(&self, indicator: &Indicator) -> Result<WriteOutcome> {
        // xmax is zero only for a freshly inserted tuple, so the RETURNING
        // clause tells the two branches of the upsert apart.
        let row = sqlx_core::query::query(
            "INSERT INTO indicators
                (hashed, kind, original, tags, owner, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (hashed) DO UPDATE SET updated_at = EXCLUDED.updated_at
             RETURNING (xmax = 0) AS inserted",
        )
        .bind(&indicator.hashed)
        .bind(indicator.kind.as_str())
        .bind(&indicator.original)
        .bind(serde_json::to_value(&indicator.tags)?)
        .bind(&indicator.owner)
        .bind(indicator.status.as_str())
        .bind(indicator.created_at)
        .bind(indicator.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(if row.get::<bool, _>(0) {
            WriteOutcome::Inserted
        } else {
            WriteOutcome::Existed
        })
    }

    async fn get_indicator(&self, hashed: &str) -> Result<Option<Indicator>> {
        let row = sqlx_core::query::query(&format!(
            "SELECT {INDICATOR_COLUMNS} FROM indicators WHERE hashed = $1"
        ))
        .bind(hashed)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(indicator_from_row).transpose()
    }

    async fn set_indicator_status(
        &self,
        hashed: &str,
        status: IndicatorStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx_core::query::query(
            "UPDATE indicators SET status = $2, updated_at = $3 WHERE hashed = $1",
        )
        .bind(hashed)
        .bind(status.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_indicators(
        &self,
        since: Option<DateTime<Utc>>,
        status: Option<IndicatorStatus>,
    ) -> Result<Vec<Indicator>> {
        let rows = sqlx_core::query::query(&format!(
            "SELECT {INDICATOR_COLUMNS} FROM indicators
             WHERE ($1::timestamptz IS NULL OR updated_at >= $1)
               AND ($2::text IS NULL OR status = $2)
             ORDER BY updated_at DESC"
        ))
        .bind(since)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(indicator_from_row).collect()
    }

    async fn matching_hashes(
        &self,
        kind: IndicatorKind,
        status: IndicatorStatus,
        candidates: &[String],
    ) -> Result<Vec<String>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx_core::query::query(
            "SELECT hashed FROM indicators
             WHERE kind = $1 AND status = $2 AND hashed = ANY($3)",
        )
        .bind(kind.as_str())
        .bind(status.as_str())
        .bind(candidates.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
    }

    async fn insert_user(&self, user: &User) -> Result<WriteOutcome> {
        let result = sqlx_core::query::query(
            "INSERT INTO users (id, name, email, api_key, role, activated, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(user.email.to_lowercase())
        .bind(user.key.to_lowercase())
        .bind(user.role.as_str())
        .bind(user.activated)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(if result.rows_affected() == 1 {
            WriteOutcome::Inserted
        } else {
            WriteOutcome::Existed
        })
    }

    async fn get_user_by_key(&self, key: &str) -> Result<Option<User>> {
        let row = sqlx_core::query::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE api_key = $1"
        ))
        .bind(key.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx_core::query::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx_core::query::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn set_user_activated(&self, id: &str, activated: bool) -> Result<bool> {
        let result = sqlx_core::query::query("UPDATE users SET activated = $2 WHERE id = $1")
            .bind(id)
            .bind(activated)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO reviews (id, indicator, requested_by, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&review.id)
        .bind(&review.indicator)
        .bind(&review.requested_by)
        .bind(review.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_reviews(&self) -> Result<Vec<Review>> {
        let rows = sqlx_core::query::query(
            "SELECT id, indicator, requested_by, created_at FROM reviews ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(review_from_row).collect())
    }

    async fn list_reviews_for(&self, indicator: &str) -> Result<Vec<Review>> {
        let rows = sqlx_core::query::query(
            "SELECT id, indicator, requested_by, created_at FROM reviews
             WHERE indicator = $1 ORDER BY created_at DESC",
        )
        .bind(indicator)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(review_from_row).collect())
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO alerts (id, kind, matched, indicator, user_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&alert.id)
        .bind(&alert.kind)
        .bind(&alert.matched)
        .bind(&alert.indicator)
        .bind(&alert.user_id)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_alerts(&self, offset: u64, limit: Option<u64>) -> Result<Vec<Alert>> {
        // LIMIT NULL means no limit.
        let limit = limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = sqlx_core::query::query(
            "SELECT id, kind, matched, indicator, user_id, created_at FROM alerts
             ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| Alert {
                id: r.get(0),
                kind: r.get(1),
                matched: r.get(2),
                indicator: r.get(3),
                user_id: r.get(4),
                created_at: r.get(5),
            })
            .collect())
    }
}
