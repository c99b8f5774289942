//! # jotter-api
//!
//! HTTP API for jotter: bearer-token authentication, owner-scoped note
//! operations and attachment upload to object storage.
//!
//! The binary in `main.rs` wires configuration, database and storage
//! together; everything else lives here so the router can be exercised in
//! tests without a running server.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod services;
pub mod state;
pub mod telemetry;

pub use app::{build_router, ApiDoc, RouterOptions};
pub use auth::{AuthenticatedUser, TokenVerifier};
pub use config::ServerConfig;
pub use error::ApiError;
pub use services::{NoteService, Upload};
pub use state::AppState;
