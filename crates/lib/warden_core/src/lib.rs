//! # warden_core
//!
//! Core authentication and permission logic for Warden.

pub mod audit;
pub mod auth;
pub mod clock;
pub mod migrate;
pub mod models;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
