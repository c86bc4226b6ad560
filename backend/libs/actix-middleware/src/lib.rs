//! # Actix Middleware Library
//!
//! Shared middleware for the realtime hub's HTTP surface
//!
//! ## Modules
//! - `jwt_auth`: HS256 bearer authentication and the `UserId` extractor
//! - `request_id`: per-request id propagated through `X-Request-ID`
//! - `logging`: request/response tracing

pub mod jwt_auth;
pub mod logging;
pub mod request_id;

pub use jwt_auth::{AuthError, Claims, JwtAuthMiddleware, JwtValidator, UserId};
pub use logging::Logging;
pub use request_id::{RequestId, RequestIdMiddleware};
