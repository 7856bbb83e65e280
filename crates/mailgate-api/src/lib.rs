//! Mailgate API - HTTP surface
//!
//! This crate provides the external key-authenticated API and the
//! JWT-authenticated admin API, including authentication middleware,
//! the JSON response envelope, and request logging.

pub mod auth;
pub mod envelope;
pub mod handlers;
pub mod params;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
