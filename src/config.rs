use std::env;

use anyhow::{Context, Result};
use serde::Serialize;

/// Default port the node listens on.
pub const DEFAULT_PORT: u16 = 7856;

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    /// PostgreSQL connection URL (when set and starts with postgres://, uses Postgres backend)
    pub database_url: Option<String>,
    /// When false, reading the feed needs no key and user management is off.
    pub enforce_user_auth: bool,
    /// Free-form contact addresses published through /api/config.
    pub operator_contacts: Vec<String>,
    pub bind: String,
    pub port: u16,
}

/// The part of the configuration clients are allowed to see.
#[derive(Debug, Clone, Serialize)]
pub struct PublicConfig {
    pub enforce_user_auth: bool,
    pub operator_contacts: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        let enforce_user_auth = match env::var("PHISHNODE_ENFORCE_AUTH") {
            Ok(value) => parse_bool(&value)
                .with_context(|| format!("PHISHNODE_ENFORCE_AUTH has an invalid value: {value}"))?,
            Err(_) => false,
        };

        let port = match env::var("PORT") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {value}"))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            db_path: env::var("PHISHNODE_DB_PATH").unwrap_or_else(|_| "./phishnode.db".to_string()),
            database_url: env::var("DATABASE_URL").ok(),
            enforce_user_auth,
            operator_contacts: env::var("PHISHNODE_OPERATOR_CONTACTS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            bind: env::var("PHISHNODE_BIND").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port,
        })
    }

    pub fn public(&self) -> PublicConfig {
        PublicConfig {
            enforce_user_auth: self.enforce_user_auth,
            operator_contacts: self.operator_contacts.clone(),
        }
    }

    /// True when DATABASE_URL points at PostgreSQL.
    pub fn uses_postgres(&self) -> bool {
        self.database_url
            .as_deref()
            .is_some_and(|url| url.starts_with("postgres://") || url.starts_with("postgresql://"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "./phishnode.db".to_string(),
            database_url: None,
            enforce_user_auth: false,
            operator_contacts: Vec::new(),
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected true or false, got '{other}'"),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
