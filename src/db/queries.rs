// Database queries - CRUD operations for all tables.
//
// Every SQLite interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::models::{Alert, Indicator, IndicatorKind, IndicatorStatus, Review, Role, User, WriteOutcome};

/// Render a timestamp the way every table stores it.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid stored timestamp '{value}'"))?;
    Ok(parsed.with_timezone(&Utc))
}

// --- Indicators ---

/// Column values as read from SQLite, before enum/timestamp conversion.
struct IndicatorRow {
    hashed: String,
    kind: String,
    original: String,
    tags: String,
    owner: String,
    status: String,
    created_at: String,
    updated_at: String,
}

const INDICATOR_COLUMNS: &str =
    "hashed, kind, original, tags, owner, status, created_at, updated_at";

fn read_indicator_row(row: &Row<'_>) -> rusqlite::Result<IndicatorRow> {
    Ok(IndicatorRow {
        hashed: row.get(0)?,
        kind: row.get(1)?,
        original: row.get(2)?,
        tags: row.get(3)?,
        owner: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl IndicatorRow {
    fn into_indicator(self) -> Result<Indicator> {
        let tags: BTreeSet<String> = serde_json::from_str(&self.tags)
            .with_context(|| format!("Invalid tags stored for indicator {}", self.hashed))?;
        Ok(Indicator {
            kind: self.kind.parse()?,
            original: self.original,
            tags,
            owner: self.owner,
            status: self.status.parse()?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            hashed: self.hashed,
        })
    }
}

/// Insert a new indicator or touch the existing one with the same hash.
///
/// Both statements run in one transaction so a concurrent writer on another
/// connection can't slip an insert between the check and the write.
pub fn insert_or_touch_indicator(conn: &Connection, ioc: &Indicator) -> Result<WriteOutcome> {
    let tx = conn.unchecked_transaction()?;
    let tags_json = serde_json::to_string(&ioc.tags)?;
    let inserted = tx.execute(
        "INSERT INTO indicators (hashed, kind, original, tags, owner, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(hashed) DO NOTHING",
        params![
            ioc.hashed,
            ioc.kind.as_str(),
            ioc.original,
            tags_json,
            ioc.owner,
            ioc.status.as_str(),
            format_ts(&ioc.created_at),
            format_ts(&ioc.updated_at),
        ],
    )?;

    let outcome = if inserted == 1 {
        WriteOutcome::Inserted
    } else {
        tx.execute(
            "UPDATE indicators SET updated_at = ?2 WHERE hashed = ?1",
            params![ioc.hashed, format_ts(&ioc.updated_at)],
        )?;
        WriteOutcome::Existed
    };
    tx.commit()?;
    Ok(outcome)
}

pub fn get_indicator(conn: &Connection, hashed: &str) -> Result<Option<Indicator>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INDICATOR_COLUMNS} FROM indicators WHERE hashed = ?1"
    ))?;
    let row = stmt
        .query_row(params![hashed], read_indicator_row)
        .optional()?;
    row.map(IndicatorRow::into_indicator).transpose()
}

pub fn set_indicator_status(
    conn: &Connection,
    hashed: &str,
    status: IndicatorStatus,
    at: &DateTime<Utc>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE indicators SET status = ?2, updated_at = ?3 WHERE hashed = ?1",
        params![hashed, status.as_str(), format_ts(at)],
    )?;
    Ok(changed > 0)
}

pub fn list_indicators(
    conn: &Connection,
    since: Option<&DateTime<Utc>>,
    status: Option<IndicatorStatus>,
) -> Result<Vec<Indicator>> {
    // NULL parameters disable the corresponding filter.
    let mut stmt = conn.prepare(&format!(
        "SELECT {INDICATOR_COLUMNS} FROM indicators
         WHERE (?1 IS NULL OR updated_at >= ?1)
           AND (?2 IS NULL OR status = ?2)
         ORDER BY updated_at DESC"
    ))?;
    let rows = stmt.query_map(
        params![since.map(format_ts), status.map(|s| s.as_str())],
        read_indicator_row,
    )?;

    let mut indicators = Vec::new();
    for row in rows {
        indicators.push(row?.into_indicator()?);
    }
    Ok(indicators)
}

pub fn matching_hashes(
    conn: &Connection,
    kind: IndicatorKind,
    status: IndicatorStatus,
    candidates: &[String],
) -> Result<Vec<String>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = (0..candidates.len())
        .map(|i| format!("?{}", i + 3))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT hashed FROM indicators
         WHERE kind = ?1 AND status = ?2 AND hashed IN ({placeholders})"
    ))?;
    let values = [kind.as_str(), status.as_str()]
        .into_iter()
        .chain(candidates.iter().map(String::as_str));
    let rows = stmt.query_map(params_from_iter(values), |row| row.get(0))?;
    let mut hashes = Vec::new();
    for row in rows {
        hashes.push(row?);
    }
    Ok(hashes)
}

// --- Users ---

const USER_COLUMNS: &str = "id, name, email, api_key, role, activated, created_at";

struct UserRow {
    id: String,
    name: String,
    email: String,
    key: String,
    role: String,
    activated: bool,
    created_at: String,
}

fn read_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        key: row.get(3)?,
        role: row.get(4)?,
        activated: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl UserRow {
    fn into_user(self) -> Result<User> {
        let role: Role = self.role.parse()?;
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            key: self.key,
            role,
            activated: self.activated,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

pub fn insert_user(conn: &Connection, user: &User) -> Result<WriteOutcome> {
    let inserted = conn.execute(
        "INSERT INTO users (id, name, email, api_key, role, activated, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(email) DO NOTHING",
        params![
            user.id,
            user.name,
            user.email.to_lowercase(),
            user.key.to_lowercase(),
            user.role.as_str(),
            user.activated,
            format_ts(&user.created_at),
        ],
    )?;
    Ok(if inserted == 1 {
        WriteOutcome::Inserted
    } else {
        WriteOutcome::Existed
    })
}

pub fn get_user_by_key(conn: &Connection, key: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE api_key = ?1"
    ))?;
    let row = stmt
        .query_row(params![key.to_lowercase()], read_user_row)
        .optional()?;
    row.map(UserRow::into_user).transpose()
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
    let row = stmt.query_row(params![id], read_user_row).optional()?;
    row.map(UserRow::into_user).transpose()
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
    ))?;
    let rows = stmt.query_map([], read_user_row)?;
    let mut users = Vec::new();
    for row in rows {
        users.push(row?.into_user()?);
    }
    Ok(users)
}

pub fn set_user_activated(conn: &Connection, id: &str, activated: bool) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET activated = ?2 WHERE id = ?1",
        params![id, activated],
    )?;
    Ok(changed > 0)
}

// --- Reviews ---

pub fn insert_review(conn: &Connection, review: &Review) -> Result<()> {
    conn.execute(
        "INSERT INTO reviews (id, indicator, requested_by, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            review.id,
            review.indicator,
            review.requested_by,
            format_ts(&review.created_at),
        ],
    )?;
    Ok(())
}

const REVIEW_COLUMNS: &str = "id, indicator, requested_by, created_at";

fn read_review(row: &Row<'_>) -> rusqlite::Result<(String, String, Option<String>, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn collect_reviews(
    rows: impl Iterator<Item = rusqlite::Result<(String, String, Option<String>, String)>>,
) -> Result<Vec<Review>> {
    let mut reviews = Vec::new();
    for row in rows {
        let (id, indicator, requested_by, created_at) = row?;
        reviews.push(Review {
            id,
            indicator,
            requested_by,
            created_at: parse_ts(&created_at)?,
        });
    }
    Ok(reviews)
}

pub fn list_reviews(conn: &Connection) -> Result<Vec<Review>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map([], read_review)?;
    collect_reviews(rows)
}

/// Uses `idx_reviews_indicator`.
pub fn list_reviews_for(conn: &Connection, indicator: &str) -> Result<Vec<Review>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE indicator = ?1 ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![indicator], read_review)?;
    collect_reviews(rows)
}

// --- Alerts ---

pub fn insert_alert(conn: &Connection, alert: &Alert) -> Result<()> {
    conn.execute(
        "INSERT INTO alerts (id, kind, matched, indicator, user_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            alert.id,
            alert.kind,
            alert.matched,
            alert.indicator,
            alert.user_id,
            format_ts(&alert.created_at),
        ],
    )?;
    Ok(())
}

pub fn list_alerts(conn: &Connection, offset: u64, limit: Option<u64>) -> Result<Vec<Alert>> {
    // SQLite reads a negative LIMIT as "no limit".
    let limit = match limit {
        Some(limit) => i64::try_from(limit).unwrap_or(i64::MAX),
        None => -1,
    };
    let offset = i64::try_from(offset).unwrap_or(i64::MAX);

    let mut stmt = conn.prepare(
        "SELECT id, kind, matched, indicator, user_id, created_at FROM alerts
         ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
    )?;
    let rows = stmt.query_map(params![limit, offset], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut alerts = Vec::new();
    for row in rows {
        let (id, kind, matched, indicator, user_id, created_at) = row?;
        alerts.push(Alert {
            id,
            kind,
            matched,
            indicator,
            user_id,
            created_at: parse_ts(&created_at)?,
        });
    }
    Ok(alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;
    use chrono::Duration;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    fn sample_indicator(hashed: &str, status: IndicatorStatus) -> Indicator {
        let now = Utc::now();
        Indicator {
            kind: IndicatorKind::Domain,
            original: "example.com".to_string(),
            hashed: hashed.to_string(),
            tags: ["phishing".to_string()].into_iter().collect(),
            created_at: now,
            updated_at: now,
            owner: "alice".to_string(),
            status,
        }
    }

    #[test]
    fn test_insert_then_touch() {
        let conn = test_conn();
        let first = sample_indicator("aa", IndicatorStatus::Enabled);
        assert_eq!(
            insert_or_touch_indicator(&conn, &first).unwrap(),
            WriteOutcome::Inserted
        );

        let mut again = sample_indicator("aa", IndicatorStatus::Pending);
        again.tags = ["other".to_string()].into_iter().collect();
        again.updated_at = first.updated_at + Duration::seconds(30);
        assert_eq!(
            insert_or_touch_indicator(&conn, &again).unwrap(),
            WriteOutcome::Existed
        );

        let stored = get_indicator(&conn, "aa").unwrap().unwrap();
        assert_eq!(stored.status, IndicatorStatus::Enabled);
        assert!(stored.tags.contains("phishing"));
        assert!(!stored.tags.contains("other"));
        assert!(stored.updated_at > stored.created_at);
    }

    #[test]
    fn test_list_filters_by_window_and_status() {
        let conn = test_conn();
        let mut old = sample_indicator("old", IndicatorStatus::Enabled);
        old.created_at = Utc::now() - Duration::days(400);
        old.updated_at = old.created_at;
        insert_or_touch_indicator(&conn, &old).unwrap();
        insert_or_touch_indicator(&conn, &sample_indicator("new", IndicatorStatus::Enabled))
            .unwrap();
        insert_or_touch_indicator(&conn, &sample_indicator("off", IndicatorStatus::Disabled))
            .unwrap();

        let all = list_indicators(&conn, None, None).unwrap();
        assert_eq!(all.len(), 3);

        let since = Utc::now() - Duration::days(30);
        let recent_enabled =
            list_indicators(&conn, Some(&since), Some(IndicatorStatus::Enabled)).unwrap();
        assert_eq!(recent_enabled.len(), 1);
        assert_eq!(recent_enabled[0].hashed, "new");
    }

    #[test]
    fn test_set_status_unknown_hash() {
        let conn = test_conn();
        assert!(!set_indicator_status(&conn, "nope", IndicatorStatus::Enabled, &Utc::now()).unwrap());
    }

    #[test]
    fn test_user_email_unique_case_insensitive() {
        let conn = test_conn();
        let user = User {
            id: "1".to_string(),
            name: "Alice".to_string(),
            email: "alice@example.org".to_string(),
            key: "ab".repeat(20),
            role: Role::Submitter,
            activated: true,
            created_at: Utc::now(),
        };
        assert_eq!(insert_user(&conn, &user).unwrap(), WriteOutcome::Inserted);

        let dup = User {
            id: "2".to_string(),
            email: "ALICE@example.org".to_string(),
            key: "cd".repeat(20),
            ..user.clone()
        };
        assert_eq!(insert_user(&conn, &dup).unwrap(), WriteOutcome::Existed);
        assert_eq!(list_users(&conn).unwrap().len(), 1);

        let found = get_user_by_key(&conn, &"AB".repeat(20)).unwrap().unwrap();
        assert_eq!(found.id, "1");
        assert_eq!(found.role, Role::Submitter);
    }

    #[test]
    fn test_reviews_newest_first() {
        let conn = test_conn();
        let now = Utc::now();
        for (i, offset) in [10, 0].iter().enumerate() {
            insert_review(
                &conn,
                &Review {
                    id: i.to_string(),
                    indicator: "aa".to_string(),
                    requested_by: None,
                    created_at: now - Duration::minutes(*offset),
                },
            )
            .unwrap();
        }
        let reviews = list_reviews(&conn).unwrap();
        assert_eq!(reviews[0].id, "1");
        assert_eq!(reviews[1].id, "0");
    }

    #[test]
    fn test_reviews_for_one_indicator() {
        let conn = test_conn();
        for (id, indicator) in [("r1", "aa"), ("r2", "bb"), ("r3", "aa")] {
            insert_review(
                &conn,
                &Review {
                    id: id.to_string(),
                    indicator: indicator.to_string(),
                    requested_by: Some("u1".to_string()),
                    created_at: Utc::now(),
                },
            )
            .unwrap();
        }
        let reviews = list_reviews_for(&conn, "aa").unwrap();
        assert_eq!(reviews.len(), 2);
        assert!(reviews.iter().all(|r| r.indicator == "aa"));
        assert!(list_reviews_for(&conn, "cc").unwrap().is_empty());
    }

    #[test]
    fn test_alert_pages_newest_first() {
        let conn = test_conn();
        let now = Utc::now();
        for i in 0..5 {
            insert_alert(
                &conn,
                &Alert {
                    id: format!("a{i}"),
                    kind: "url".to_string(),
                    matched: format!("https://login{i}.evil.com/"),
                    indicator: "aa".to_string(),
                    user_id: None,
                    created_at: now + Duration::seconds(i),
                },
            )
            .unwrap();
        }

        let all = list_alerts(&conn, 0, None).unwrap();
        let ids: Vec<&str> = all.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["a4", "a3", "a2", "a1", "a0"]);

        let page = list_alerts(&conn, 1, Some(2)).unwrap();
        let ids: Vec<&str> = page.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["a3", "a2"]);

        assert!(list_alerts(&conn, 10, Some(2)).unwrap().is_empty());
    }
}
