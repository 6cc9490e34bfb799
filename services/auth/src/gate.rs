//! Session validation gate
//!
//! The single authorization choke point: every protected handler resolves
//! its identity here before issuing any tenant-data query. A session is
//! honored only when the token matches a live, unexpired, unrestricted
//! session whose user is still active and not deleted. An un-expired
//! token stops working the moment its account is deactivated.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use datastore::{Datastore, Filter, FirstOptions};

use crate::error::{AuthError, AuthResult};
use crate::models::{SESSION_COLLECTION, Session, USER_COLLECTION, UserStatus, UserSummary};

/// The resolved identity downstream handlers are permitted to trust.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub session: Session,
    pub user: UserSummary,
}

/// Validates inbound session tokens against the datastore.
pub struct SessionGate<S: Datastore> {
    store: Arc<S>,
}

impl<S: Datastore> SessionGate<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve a token to its session and user, or reject.
    ///
    /// Rejects without I/O when no token is presented. An expired or
    /// restricted session is indistinguishable from an unknown token.
    pub async fn authenticate(&self, token: Option<&str>) -> AuthResult<AuthContext> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthError::MissingToken),
        };

        let session_filter = Filter::new()
            .eq("token", token)
            .gte("expiresAt", bson::DateTime::from_chrono(Utc::now()))
            .ne("restricted", true);
        let session_doc = self
            .store
            .first(SESSION_COLLECTION, session_filter, FirstOptions::default())
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        let session: Session = bson::from_document(session_doc)?;
        debug!(session = %session.id, "session resolved");

        let user_id = session.user_id().ok_or(AuthError::UserNotFound)?;
        let user_filter = Filter::new()
            .eq("_id", user_id)
            .eq("status", UserStatus::Active.as_str())
            .not_deleted();
        let user_doc = self
            .store
            .first(
                USER_COLLECTION,
                user_filter,
                FirstOptions {
                    projection: Some(vec!["username".to_string()]),
                },
            )
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let user: UserSummary = bson::from_document(user_doc)?;
        debug!(user = %user.id, "authorized");

        Ok(AuthContext { session, user })
    }
}
