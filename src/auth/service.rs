use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::password::PasswordHasher;
use crate::auth::store::{StoreError, User, UserPatch, UserQuery, UserStore};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user {0} already exists")]
    AlreadyRegistered(String),
    #[error("no user registered under that email")]
    UserNotFound,
    #[error("reset token did not match any user")]
    InvalidResetToken,
    #[error("password hashing failed")]
    Hash(#[source] anyhow::Error),
    #[error("user store failed")]
    Store(#[source] StoreError),
}

/// Opaque collision-resistant token for sessions and password resets.
fn generate_token() -> String {
    Uuid::new_v4().to_string()
}

/// Registration, credential verification, session lifecycle and reset-token
/// lifecycle. Stateless; all state lives in the injected store.
///
/// Lookup misses never surface as raw store errors. Each operation maps them
/// to a bool, a `None`, a silent no-op, or a typed [`AuthError`], and callers
/// rely on that distinction.
pub struct AuthManager {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
}

impl AuthManager {
    pub fn new(store: Arc<dyn UserStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { store, hasher }
    }

    /// Register a new user. Fails with [`AuthError::AlreadyRegistered`] when
    /// the email is taken.
    pub async fn register_user(&self, email: &str, password: &str) -> Result<User, AuthError> {
        if self.find_by_email(email).await?.is_some() {
            warn!(email = %email, "registration for existing email");
            return Err(AuthError::AlreadyRegistered(email.to_string()));
        }

        let hash = self.hasher.hash(password).map_err(AuthError::Hash)?;
        let user = self
            .store
            .add_user(email, &hash)
            .await
            .map_err(AuthError::Store)?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Check credentials. Unknown email is `Ok(false)`, not an error.
    pub async fn valid_login(&self, email: &str, password: &str) -> Result<bool, AuthError> {
        let Some(user) = self.find_by_email(email).await? else {
            return Ok(false);
        };
        self.hasher
            .verify(password, &user.password_hash)
            .map_err(AuthError::Hash)
    }

    /// Open a session for the user, overwriting any previous session token.
    /// Unknown email yields `Ok(None)`.
    pub async fn create_session(&self, email: &str) -> Result<Option<String>, AuthError> {
        let Some(user) = self.find_by_email(email).await? else {
            return Ok(None);
        };

        let token = generate_token();
        match self
            .store
            .update_user(user.id, UserPatch::session_token(Some(token.clone())))
            .await
        {
            Ok(()) => {}
            // User vanished between lookup and update; same outcome as an
            // unknown email.
            Err(StoreError::NotFound) => return Ok(None),
            Err(e) => return Err(AuthError::Store(e)),
        }
        debug!(user_id = %user.id, "session created");
        Ok(Some(token))
    }

    /// Resolve a session token to its user. Absent or empty input
    /// short-circuits without a store lookup.
    pub async fn user_from_session_token(
        &self,
        token: Option<&str>,
    ) -> Result<Option<User>, AuthError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        self.store
            .find_user_by(UserQuery::SessionToken(token.to_string()))
            .await
            .map_err(AuthError::Store)
    }

    /// Clear the user's session token. Absent id and unknown user are both
    /// no-ops.
    pub async fn destroy_session(&self, user_id: Option<Uuid>) -> Result<(), AuthError> {
        let Some(user_id) = user_id else {
            return Ok(());
        };
        match self
            .store
            .update_user(user_id, UserPatch::session_token(None))
            .await
        {
            Ok(()) => {
                debug!(user_id = %user_id, "session destroyed");
                Ok(())
            }
            Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(AuthError::Store(e)),
        }
    }

    /// Issue a password-reset token, overwriting any previous one. Unknown
    /// email fails with [`AuthError::UserNotFound`].
    pub async fn reset_password_token(&self, email: &str) -> Result<String, AuthError> {
        let Some(user) = self.find_by_email(email).await? else {
            warn!(email = %email, "reset token requested for unknown email");
            return Err(AuthError::UserNotFound);
        };

        let token = generate_token();
        match self
            .store
            .update_user(user.id, UserPatch::reset_token(Some(token.clone())))
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(AuthError::UserNotFound),
            Err(e) => return Err(AuthError::Store(e)),
        }
        info!(user_id = %user.id, "reset token issued");
        Ok(token)
    }

    /// Consume a reset token and set a new password. Either argument absent
    /// is a silent pass-through; an unmatched token fails with
    /// [`AuthError::InvalidResetToken`].
    pub async fn update_password(
        &self,
        reset_token: Option<&str>,
        new_password: Option<&str>,
    ) -> Result<(), AuthError> {
        let (Some(reset_token), Some(new_password)) = (reset_token, new_password) else {
            return Ok(());
        };

        let user = self
            .store
            .find_user_by(UserQuery::ResetToken(reset_token.to_string()))
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::InvalidResetToken)?;

        let hash = self.hasher.hash(new_password).map_err(AuthError::Hash)?;
        match self
            .store
            .update_user(user.id, UserPatch::password_update(hash))
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(AuthError::InvalidResetToken),
            Err(e) => return Err(AuthError::Store(e)),
        }
        info!(user_id = %user.id, "password updated");
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        self.store
            .find_user_by(UserQuery::Email(email.to_string()))
            .await
            .map_err(AuthError::Store)
    }
}
