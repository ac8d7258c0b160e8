// RoleAuthority - per-request authorization gate.
//
// Every operation names the minimum role it needs (or none). The caller's key
// is shape-checked, resolved to a user, and the user's role compared against
// the requirement by rank: user < submitter < admin.
//
// When the node runs without enforcement, operations that only need `user`
// are open to anyone; submitter and admin operations still need a key.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex_lite::Regex;
use tracing::debug;

use crate::db::models::{Role, User};
use crate::db::Database;
use crate::error::{NodeError, Result};

/// Length of an API key in hex characters.
pub const KEY_LEN: usize = 40;

/// True when `key` looks like an API key. Case-insensitive.
pub fn is_valid_key_format(key: &str) -> bool {
    static KEY_RE: OnceLock<Regex> = OnceLock::new();
    KEY_RE
        .get_or_init(|| Regex::new(r"(?i)^[a-f0-9]{40}$").expect("valid key regex"))
        .is_match(key)
}

/// Whether a caller holding `role` may perform an operation requiring `required`.
pub fn role_satisfies(role: Role, required: Role) -> bool {
    role.rank() >= required.rank()
}

/// Key-to-user resolution, the only store access the gate performs.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn user_by_key(&self, key: &str) -> anyhow::Result<Option<User>>;
}

#[async_trait]
impl<T: Database + ?Sized> UserLookup for T {
    async fn user_by_key(&self, key: &str) -> anyhow::Result<Option<User>> {
        self.get_user_by_key(key).await
    }
}

pub struct RoleAuthority<L: ?Sized + UserLookup = dyn Database> {
    lookup: Arc<L>,
    enforce: bool,
}

impl<L: ?Sized + UserLookup> RoleAuthority<L> {
    pub fn new(lookup: Arc<L>, enforce: bool) -> Self {
        Self { lookup, enforce }
    }

    pub fn enforces_auth(&self) -> bool {
        self.enforce
    }

    /// Decide whether the holder of `key` may run an operation needing
    /// `required`. Returns the resolved user when one was looked up.
    pub async fn authorize(&self, key: Option<&str>, required: Option<Role>) -> Result<Option<User>> {
        let Some(required) = required else {
            return Ok(None);
        };
        if !self.enforce && required == Role::User {
            return Ok(None);
        }

        let user = self.resolve(key).await?;
        if !role_satisfies(user.role, required) {
            debug!(user = %user.name, role = %user.role, required = %required, "Insufficient role");
            return Err(NodeError::NotAuthorized);
        }
        Ok(Some(user))
    }

    /// Resolve `key` to its user regardless of the enforcement setting.
    ///
    /// Missing and unknown keys are `NotAuthorized`; an inactive user is
    /// `NotActivated` when the node enforces authentication.
    pub async fn resolve(&self, key: Option<&str>) -> Result<User> {
        let key = match key.map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => return Err(NodeError::NotAuthorized),
        };
        if !is_valid_key_format(key) {
            debug!("Rejected malformed API key");
            return Err(NodeError::InvalidKeyFormat);
        }

        let user = self
            .lookup
            .user_by_key(key)
            .await?
            .ok_or(NodeError::NotAuthorized)?;

        if self.enforce && !user.activated {
            return Err(NodeError::NotActivated);
        }
        Ok(user)
    }
}
