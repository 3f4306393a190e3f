//! REST API client module for the device command backend.
//!
//! This module provides the `ApiClient` for listing devices, submitting
//! commands, reading command history and issuing registration tokens.
//!
//! Authenticated endpoints take a JWT bearer token obtained from the
//! login endpoint and kept fresh by the session store.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
