//! User service
//!
//! Registration, login/logout and session validation. Sessions are rows in
//! the `sessions` table keyed by a random UUID; the API layer signs that
//! token into the cookie.

use crate::config::{AuthConfig, BootstrapAdmin};
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Longest username accepted at registration
const MAX_USERNAME_LENGTH: usize = 64;

/// Message shown for any bad username/password combination
pub const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("{0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("{0}")]
    ValidationError(String),

    /// Username already taken
    #[error("Username '{0}' is already taken")]
    UserExists(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
    min_password_length: usize,
}

impl UserService {
    /// Create a user service with the default auth settings
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self::with_config(user_repo, session_repo, &AuthConfig::default())
    }

    /// Create a user service using the `auth` section of the configuration
    pub fn with_config(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days: config.session_expiration_days,
            min_password_length: config.min_password_length,
        }
    }

    /// Register a new account.
    ///
    /// The very first account becomes an administrator. With the default
    /// configuration that account is the bootstrap admin, so registered
    /// users are regular users.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a blank username, an overlong username or a short password
    /// - `UserExists` if the username is taken
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        self.validate_register_input(&username, &input.password)?;

        if self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(username));
        }

        let is_admin = self.is_first_user().await?;
        let password_hash = hash_password(&input.password)?;

        let created = self
            .user_repo
            .create(&User::new(username, password_hash, is_admin))
            .await
            .context("Failed to create user")?;

        tracing::info!(user_id = created.id, username = %created.username, "User registered");
        Ok(created)
    }

    /// Check credentials and open a new session
    ///
    /// # Errors
    ///
    /// - `AuthenticationError` with [`INVALID_CREDENTIALS`] for an unknown user or wrong password
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(input.username.trim())
            .await
            .context("Failed to look up user")?;

        let user = match user {
            Some(user) if verify_password(&input.password, &user.password_hash)? => user,
            _ => {
                tracing::info!(username = %input.username, "Rejected login attempt");
                return Err(UserServiceError::AuthenticationError(
                    INVALID_CREDENTIALS.to_string(),
                ));
            }
        };

        let session = self.start_session(user.id).await?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok(session)
    }

    /// Invalidate a session. Unknown tokens are ignored.
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Returns `None` for unknown or expired sessions; expired rows are
    /// removed on the way out.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to remove expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    /// `true` when no users exist yet
    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        Ok(count == 0)
    }

    /// Create the configured admin account when the users table is empty.
    ///
    /// The password length policy does not apply here. Returns the created
    /// user, or `None` when users already exist.
    pub async fn ensure_bootstrap_admin(
        &self,
        admin: &BootstrapAdmin,
    ) -> Result<Option<User>, UserServiceError> {
        if !self.is_first_user().await? {
            return Ok(None);
        }

        let password_hash = hash_password(&admin.password)?;
        let created = self
            .user_repo
            .create(&User::new(admin.username.clone(), password_hash, true))
            .await
            .context("Failed to create bootstrap admin")?;

        tracing::info!(username = %created.username, "Created bootstrap admin account");
        Ok(Some(created))
    }

    /// Delete all expired sessions, returns how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired(Utc::now())
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    fn validate_register_input(&self, username: &str, password: &str) -> Result<(), UserServiceError> {
        if username.is_empty() || password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Username and password are required".to_string(),
            ));
        }
        if username.chars().count() > MAX_USERNAME_LENGTH {
            return Err(UserServiceError::ValidationError(format!(
                "Username must be at most {} characters",
                MAX_USERNAME_LENGTH
            )));
        }
        if password.chars().count() < self.min_password_length {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters long",
                self.min_password_length
            )));
        }
        Ok(())
    }

    /// Open a session for an already authenticated user
    pub async fn start_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::new(
            Uuid::new_v4().to_string(),
            user_id,
            self.session_expiration_days,
        );

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_service() -> (UserService, Arc<dyn SessionRepository>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let service = UserService::new(SqlxUserRepository::boxed(pool), session_repo.clone());
        (service, session_repo)
    }

    #[tokio::test]
    async fn test_first_registered_user_is_admin() {
        let (service, _) = setup_test_service().await;

        let first = service
            .register(RegisterInput::new("founder", "password123"))
            .await
            .expect("Failed to register");
        let second = service
            .register(RegisterInput::new("member", "password456"))
            .await
            .expect("Failed to register");

        assert!(first.is_admin);
        assert!(!second.is_admin);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (service, _) = setup_test_service().await;

        let short = service.register(RegisterInput::new("writer", "short")).await;
        assert!(matches!(short, Err(UserServiceError::ValidationError(_))));

        let blank = service.register(RegisterInput::new("   ", "password123")).await;
        assert!(matches!(blank, Err(UserServiceError::ValidationError(_))));

        let long_name = "x".repeat(65);
        let long = service.register(RegisterInput::new(long_name, "password123")).await;
        assert!(matches!(long, Err(UserServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_register_duplicate_username() {
        let (service, _) = setup_test_service().await;
        service
            .register(RegisterInput::new("writer", "password123"))
            .await
            .unwrap();

        let dup = service.register(RegisterInput::new("writer", "password456")).await;
        assert!(matches!(dup, Err(UserServiceError::UserExists(name)) if name == "writer"));
    }

    #[tokio::test]
    async fn test_login_and_validate_session() {
        let (service, _) = setup_test_service().await;
        let user = service
            .register(RegisterInput::new("writer", "password123"))
            .await
            .unwrap();

        let session = service
            .login(LoginInput::new("writer", "password123"))
            .await
            .expect("Login should succeed");
        assert_eq!(session.user_id, user.id);

        let resolved = service
            .validate_session(&session.id)
            .await
            .unwrap()
            .expect("Session should be valid");
        assert_eq!(resolved.username, "writer");
    }

    #[tokio::test]
    async fn test_login_wrong_password_and_unknown_user() {
        let (service, _) = setup_test_service().await;
        service
            .register(RegisterInput::new("writer", "password123"))
            .await
            .unwrap();

        for input in [
            LoginInput::new("writer", "not-the-password"),
            LoginInput::new("nobody", "password123"),
        ] {
            match service.login(input).await {
                Err(UserServiceError::AuthenticationError(msg)) => {
                    assert_eq!(msg, INVALID_CREDENTIALS)
                }
                other => panic!("Expected authentication error, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let (service, _) = setup_test_service().await;
        service
            .register(RegisterInput::new("writer", "password123"))
            .await
            .unwrap();
        let session = service
            .login(LoginInput::new("writer", "password123"))
            .await
            .unwrap();

        service.logout(&session.id).await.unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_removed() {
        let (service, session_repo) = setup_test_service().await;
        let user = service
            .register(RegisterInput::new("writer", "password123"))
            .await
            .unwrap();

        let mut session = Session::new("expired-token".to_string(), user.id, 7);
        session.expires_at = Utc::now() - Duration::minutes(1);
        session_repo.create(&session).await.unwrap();

        assert!(service.validate_session("expired-token").await.unwrap().is_none());
        assert!(session_repo.get_by_id("expired-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_when_empty() {
        let (service, _) = setup_test_service().await;
        let admin = BootstrapAdmin::default();

        let created = service
            .ensure_bootstrap_admin(&admin)
            .await
            .unwrap()
            .expect("Admin should be created");
        assert!(created.is_admin);
        assert_eq!(created.username, "admin");

        assert!(service.ensure_bootstrap_admin(&admin).await.unwrap().is_none());

        // Short bootstrap password still logs in
        service
            .login(LoginInput::new("admin", "admin"))
            .await
            .expect("Bootstrap admin should log in");
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let (service, session_repo) = setup_test_service().await;
        let user = service
            .register(RegisterInput::new("writer", "password123"))
            .await
            .unwrap();

        let mut stale = Session::new("stale".to_string(), user.id, 7);
        stale.expires_at = Utc::now() - Duration::days(1);
        session_repo.create(&stale).await.unwrap();
        service
            .login(LoginInput::new("writer", "password123"))
            .await
            .unwrap();

        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 1);
    }
}
