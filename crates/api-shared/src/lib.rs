//! # API Shared
//!
//! Shared utilities and definitions for Carelith APIs.
//!
//! Contains:
//! - Request/response DTOs with OpenAPI schemas (`dto` module)
//! - Shared services like `HealthService`
//! - Authentication utilities: API-key check and caller resolution
//!
//! Used by `api-rest` and the `carelith` CLI.

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{parse_caller, validate_api_key, AuthError, CallerIdentity};
pub use dto::*;
pub use health::HealthService;
