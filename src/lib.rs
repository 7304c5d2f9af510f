//! Panneaux - community and education platform backend
//!
//! REST API for accounts, the social graph, the post and panneau feeds,
//! direct messaging, appointment booking and the course and document library.

pub mod account;
pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod feed;
pub mod jobs;
pub mod mailer;
pub mod media;
pub mod messaging;
pub mod metrics;
pub mod notifications;
pub mod rate_limit;
pub mod scheduling;
pub mod server;
pub mod social;

#[cfg(test)]
mod testing;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{ApiError, ApiResult};
