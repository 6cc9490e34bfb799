//! Common library for the content gateway workspace
//!
//! This crate provides shared functionality used across the datastore and
//! auth crates, currently identifier and session token generation.

pub mod token;
