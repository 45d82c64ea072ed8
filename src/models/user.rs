//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account.
///
/// Admins may manage provider API keys; every user owns only their own articles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Whether the user may manage API keys
    pub is_admin: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a user that has not been persisted yet.
    ///
    /// The password must already be hashed, see `services::password::hash_password`.
    pub fn new(username: String, password_hash: String, is_admin: bool) -> Self {
        Self {
            id: 0, // Will be set by the database
            username,
            password_hash,
            is_admin,
            created_at: Utc::now(),
        }
    }

    /// Check if the user is an administrator
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Whether this user owns a record with the given owner id
    pub fn owns(&self, owner_id: i64) -> bool {
        self.id == owner_id
    }
}
