//! API Module
//!
//! HTTP handlers and routing for the gateway REST API.
//!
//! # Endpoints
//! - `GET /feed/:key` - Cached upstream document for a whitelisted key
//! - `GET /settings/nonce` - Issue a settings challenge
//! - `POST /settings/update` - Apply settings with a challenge response
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
