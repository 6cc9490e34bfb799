//! Session model and related functionality

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session entity, mapped onto the stored wire document.
///
/// A session is usable for authorization only while the expiry is in the
/// future, `restricted` is false, and the referenced user is still active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id")]
    pub id: String,
    /// Opaque token of the form `sst:<32 lowercase alphanumerics>`
    pub token: String,
    /// Owning-user pointer in `User$<id>` form
    #[serde(rename = "_p_user")]
    pub user_pointer: String,
    #[serde(rename = "expiresAt", with = "chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
    /// Manual-revocation flag; invalidates the session without deleting it
    #[serde(default)]
    pub restricted: bool,
    #[serde(rename = "_created_at", with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "_updated_at", with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Encode a user id into the stored pointer form.
    pub fn pointer_for(user_id: &str) -> String {
        format!("User${user_id}")
    }

    /// The user id behind the pointer, or `None` when the pointer is
    /// malformed.
    pub fn user_id(&self) -> Option<&str> {
        self.user_pointer
            .split_once('$')
            .and_then(|(class, id)| (class == "User" && !id.is_empty()).then_some(id))
    }
}
