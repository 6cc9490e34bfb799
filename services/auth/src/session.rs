//! Session lifecycle: registration, login, logout, revocation

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use bson::doc;
use chrono::{Duration, Utc};
use tracing::info;

use common::token;
use datastore::{Datastore, Filter, FirstOptions, Patch};

use crate::error::{AuthError, AuthResult};
use crate::models::{NewUser, SESSION_COLLECTION, Session, USER_COLLECTION, User, UserStatus};

/// How long a freshly issued session stays valid.
pub const SESSION_TTL_DAYS: i64 = 30;

/// Owns the session lifecycle around the authorization gate.
pub struct SessionService<S: Datastore> {
    store: Arc<S>,
}

impl<S: Datastore> SessionService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create an active user with a hashed password.
    pub async fn register(&self, new_user: NewUser) -> AuthResult<User> {
        let taken = self
            .store
            .first(
                USER_COLLECTION,
                Filter::new().eq("username", new_user.username.as_str()).not_deleted(),
                FirstOptions::default(),
            )
            .await?
            .is_some();
        if taken {
            return Err(AuthError::DuplicateUser);
        }

        let mut record = doc! {
            "username": new_user.username.as_str(),
            "password": hash_password(&new_user.password)?,
            "status": UserStatus::Active.as_str(),
        };
        if let Some(name) = &new_user.name {
            record.insert("name", name.as_str());
        }

        let stored = self.store.insert(USER_COLLECTION, record).await?;
        info!(username = %new_user.username, "user registered");
        Ok(bson::from_document(stored)?)
    }

    /// Verify credentials and issue a fresh session.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<Session> {
        let user_doc = self
            .store
            .first(
                USER_COLLECTION,
                Filter::new()
                    .eq("username", username)
                    .eq("status", UserStatus::Active.as_str())
                    .not_deleted(),
                FirstOptions::default(),
            )
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let user: User = bson::from_document(user_doc)?;

        if !verify_password(&user.password, password)? {
            return Err(AuthError::InvalidCredentials);
        }

        let expires_at = Utc::now() + Duration::days(SESSION_TTL_DAYS);
        let record = doc! {
            "token": token::session_token(),
            "_p_user": Session::pointer_for(&user.id),
            "expiresAt": bson::DateTime::from_chrono(expires_at),
        };
        let stored = self.store.insert(SESSION_COLLECTION, record).await?;
        info!(user = %user.id, "session issued");
        Ok(bson::from_document(stored)?)
    }

    /// Physically delete the session behind the token. Returns whether a
    /// session existed. This is the sanctioned hard-delete path; tenant
    /// records are only ever soft-deleted.
    pub async fn logout(&self, token: &str) -> AuthResult<bool> {
        let deleted = self
            .store
            .delete(SESSION_COLLECTION, Filter::new().eq("token", token))
            .await?;
        Ok(deleted > 0)
    }

    /// Invalidate the session without deleting it, by setting the
    /// restricted flag. Returns how many sessions were affected.
    pub async fn revoke(&self, token: &str) -> AuthResult<u64> {
        let outcome = self
            .store
            .update(
                SESSION_COLLECTION,
                Patch::new().set("restricted", true),
                Filter::new().eq("token", token),
            )
            .await?;
        if outcome.matched > 0 {
            info!(count = outcome.matched, "session revoked");
        }
        Ok(outcome.matched)
    }
}

fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?
        .to_string())
}

fn verify_password(hash: &str, password: &str) -> AuthResult<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
