// Data models - Rust structs that map to database rows.
//
// These are the types that flow through the application. They're separate
// from the database queries so other modules can use them without depending
// on rusqlite directly.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two kinds of indicator the feed carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Email,
    Domain,
}

impl IndicatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Email => "email",
            IndicatorKind::Domain => "domain",
        }
    }
}

impl FromStr for IndicatorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(IndicatorKind::Email),
            "domain" => Ok(IndicatorKind::Domain),
            other => anyhow::bail!("unknown indicator type '{other}'"),
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moderation state of an indicator. There is no fourth state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorStatus {
    Pending,
    Enabled,
    Disabled,
}

impl IndicatorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorStatus::Pending => "pending",
            IndicatorStatus::Enabled => "enabled",
            IndicatorStatus::Disabled => "disabled",
        }
    }
}

impl FromStr for IndicatorStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IndicatorStatus::Pending),
            "enabled" => Ok(IndicatorStatus::Enabled),
            "disabled" => Ok(IndicatorStatus::Disabled),
            other => anyhow::bail!("unknown indicator status '{other}'"),
        }
    }
}

impl fmt::Display for IndicatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phishing indicator as stored. `hashed` is the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    #[serde(rename = "type")]
    pub kind: IndicatorKind,
    /// Cleartext value, empty when the submitter only provided the digest.
    pub original: String,
    pub hashed: String,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub owner: String,
    pub status: IndicatorStatus,
}

/// Account roles. Declaration order is the rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Submitter,
    Admin,
}

impl Role {
    pub fn rank(&self) -> u8 {
        match self {
            Role::User => 0,
            Role::Submitter => 1,
            Role::Admin => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Submitter => "submitter",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "submitter" => Ok(Role::Submitter),
            "admin" => Ok(Role::Admin),
            other => anyhow::bail!("unknown role '{other}'"),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Stored lower-cased; unique.
    pub email: String,
    pub key: String,
    pub role: Role,
    pub activated: bool,
    pub created_at: DateTime<Utc>,
}

/// A request to have an indicator looked at again by an administrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    /// Hash of the indicator under review.
    pub indicator: String,
    pub requested_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A client's report that something it encountered matched the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    /// What the client was inspecting, e.g. `domain`, `email` or `url`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The value the client saw, as it saw it.
    #[serde(rename = "match")]
    pub matched: String,
    /// Digest of the indicator that matched.
    pub indicator: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of a conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new row was created.
    Inserted,
    /// A row with the same identity already existed. For indicators its
    /// `updated_at` has been refreshed; for users nothing was written.
    Existed,
}
