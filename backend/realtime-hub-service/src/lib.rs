//! Realtime hub: direct and group conversations with unread tracking,
//! roadmap study rooms, and the live push layer that fans domain events out
//! to WebSocket subscribers by topic.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod websocket;

pub use error::{AppError, AppResult};
pub use state::AppState;
