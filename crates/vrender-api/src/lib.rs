//! Axum HTTP API for the render coordinator.
//!
//! This crate provides:
//! - Render submission, status polling, download and cancellation
//! - Supabase access token verification
//! - Rate limiting and security headers
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use auth::{AuthUser, JwtVerifier, SupabaseClaims};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
