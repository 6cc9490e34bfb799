//! Models for the auth service

pub mod session;
pub mod user;

pub use session::Session;
pub use user::{NewUser, User, UserStatus, UserSummary};

/// Collection holding session records.
pub const SESSION_COLLECTION: &str = "Session";

/// Collection holding user records.
pub const USER_COLLECTION: &str = "User";
