//! se-api: HTTP API for School Events
//!
//! Manual sync trigger, sync status, volumetry reports and the paginated
//! user and event listings. Built with axum.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{AppState, app, start_server};
