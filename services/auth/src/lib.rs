//! Session and identity service for the content gateway
//!
//! Every protected operation passes through [`gate::SessionGate`] before
//! touching tenant data; [`session::SessionService`] owns the session
//! lifecycle around it (login, logout, revocation).

pub mod error;
pub mod gate;
pub mod models;
pub mod session;

pub use error::{AuthError, AuthResult};
pub use gate::{AuthContext, SessionGate};
pub use session::SessionService;
