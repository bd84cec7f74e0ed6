//! se-graph: Microsoft Graph directory client
//!
//! Implements [`se_core::RemoteDirectoryClient`] over the Graph REST API
//! with an application (client-credentials) token.

pub mod auth;
pub mod client;
pub mod directory;
pub mod models;

pub use auth::TokenCache;
pub use client::GraphClient;
pub use directory::{GraphDirectory, MAX_USERS};
