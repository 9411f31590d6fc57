//! Domain models.

pub mod audit;
pub mod auth;
pub mod rbac;
