// UserRegistry - account registration and activation.
//
// Registration is self-service but lands the account in the `user` role,
// deactivated; an administrator activates it. The operator CLI can create
// accounts with any role directly.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tracing::info;
use uuid::Uuid;

use crate::authority::KEY_LEN;
use crate::db::models::{Role, User, WriteOutcome};
use crate::db::Database;
use crate::error::{NodeError, Result};
use crate::indicators::detect::is_email;

type HmacSha256 = Hmac<Sha256>;

/// Derive a fresh API key for `email`.
///
/// HMAC-SHA256 keyed with 32 random bytes over the lower-cased address,
/// hex-encoded and cut to `KEY_LEN` characters.
pub fn generate_api_key(email: &str) -> anyhow::Result<String> {
    let mut secret = [0u8; 32];
    rand::rng().fill_bytes(&mut secret);

    let mut mac = HmacSha256::new_from_slice(&secret)
        .map_err(|e| anyhow!("Failed to initialize key derivation: {e}"))?;
    mac.update(email.to_lowercase().as_bytes());
    let mut key = hex::encode(mac.finalize().into_bytes());
    key.truncate(KEY_LEN);
    Ok(key)
}

pub struct UserRegistry {
    db: Arc<dyn Database>,
    enforce: bool,
}

impl UserRegistry {
    pub fn new(db: Arc<dyn Database>, enforce: bool) -> Self {
        Self { db, enforce }
    }

    /// Self-service registration. Only available when the node enforces
    /// authentication.
    pub async fn register(&self, name: &str, email: &str) -> Result<User> {
        self.require_enforcement()?;
        self.create(name, email, Role::User, false).await
    }

    /// Create an account with an explicit role and activation state.
    pub async fn create(&self, name: &str, email: &str, role: Role, activated: bool) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(NodeError::InvalidRequest("name must not be empty".to_string()));
        }
        let email = email.trim().to_lowercase();
        if !is_email(&email) {
            return Err(NodeError::InvalidRequest(format!(
                "'{email}' is not a valid email address"
            )));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            key: generate_api_key(&email)?,
            email,
            role,
            activated,
            created_at: Utc::now(),
        };

        match self.db.insert_user(&user).await? {
            WriteOutcome::Inserted => {
                info!(id = %user.id, name = %user.name, role = %user.role, "Registered user");
                Ok(user)
            }
            WriteOutcome::Existed => Err(NodeError::AlreadyRegistered),
        }
    }

    /// Activate the account and return its updated record.
    pub async fn activate(&self, id: &str) -> Result<User> {
        self.set_activated(id, true).await
    }

    pub async fn deactivate(&self, id: &str) -> Result<User> {
        self.set_activated(id, false).await
    }

    /// Accounts waiting for activation.
    pub async fn pending(&self) -> Result<Vec<User>> {
        self.require_enforcement()?;
        Ok(self.filtered(false).await?)
    }

    pub async fn active(&self) -> Result<Vec<User>> {
        self.require_enforcement()?;
        Ok(self.filtered(true).await?)
    }

    // --- Private helpers ---

    fn require_enforcement(&self) -> Result<()> {
        if self.enforce {
            Ok(())
        } else {
            Err(NodeError::AuthNotEnforced)
        }
    }

    async fn set_activated(&self, id: &str, activated: bool) -> Result<User> {
        self.require_enforcement()?;
        let not_found = || NodeError::NotFound(format!("user {id}"));
        if !self.db.set_user_activated(id, activated).await? {
            return Err(not_found());
        }
        info!(id = %id, activated, "Changed user activation");
        self.db.get_user_by_id(id).await?.ok_or_else(not_found)
    }

    async fn filtered(&self, activated: bool) -> anyhow::Result<Vec<User>> {
        Ok(self
            .db
            .list_users()
            .await?
            .into_iter()
            .filter(|u| u.activated == activated)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::is_valid_key_format;
    use crate::db::sqlite::SqliteDatabase;

    fn registry(enforce: bool) -> UserRegistry {
        UserRegistry::new(Arc::new(SqliteDatabase::in_memory().unwrap()), enforce)
    }

    #[test]
    fn test_generated_keys_are_well_formed_and_distinct() {
        let a = generate_api_key("alice@example.com").unwrap();
        let b = generate_api_key("alice@example.com").unwrap();
        assert_eq!(a.len(), KEY_LEN);
        assert!(is_valid_key_format(&a));
        assert!(a.chars().all(|c| !c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_register_creates_inactive_user() {
        let registry = registry(true);
        let user = registry.register("Alice", "Alice@Example.com").await.unwrap();
        assert_eq!(user.role, Role::User);
        assert!(!user.activated);
        assert_eq!(user.email, "alice@example.com");

        let pending = registry.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(registry.active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_email_case_insensitively() {
        let registry = registry(true);
        registry.register("Alice", "alice@example.com").await.unwrap();
        let err = registry
            .register("Alice again", "ALICE@example.COM")
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::AlreadyRegistered));
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let registry = registry(true);
        let err = registry.register("  ", "alice@example.com").await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidRequest(_)));
        let err = registry.register("Alice", "not-an-email").await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_open_node_refuses_user_management() {
        let registry = registry(false);
        let err = registry.register("Alice", "alice@example.com").await.unwrap_err();
        assert!(matches!(err, NodeError::AuthNotEnforced));

        // The operator path still works.
        let user = registry
            .create("Ops", "ops@example.com", Role::Admin, true)
            .await
            .unwrap();
        let err = registry.deactivate(&user.id).await.unwrap_err();
        assert!(matches!(err, NodeError::AuthNotEnforced));
    }

    #[tokio::test]
    async fn test_activation_cycle() {
        let registry = registry(true);
        let user = registry.register("Bob", "bob@example.com").await.unwrap();

        let updated = registry.activate(&user.id).await.unwrap();
        assert!(updated.activated);
        assert_eq!(updated.id, user.id);
        assert_eq!(registry.active().await.unwrap().len(), 1);

        let updated = registry.deactivate(&user.id).await.unwrap();
        assert!(!updated.activated);
        assert_eq!(registry.pending().await.unwrap().len(), 1);

        let err = registry.activate("no-such-id").await.unwrap_err();
        assert!(matches!(err, NodeError::NotFound(_)));
    }
}
