//! Core library for the device command service client.
//!
//! - [`api`]: HTTP client for the device/command backend
//! - [`auth`]: session store, durable token storage and keychain credentials
//! - [`models`]: typed request and response structures
//! - [`config`]: configuration file handling

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{Session, SessionPhase, SessionStore};
pub use config::Config;
