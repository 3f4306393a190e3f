//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `SessionStore`: token lifecycle (restore, login, refresh, logout)
//! - `DurableStore`: persistence of the token pair and profile, with a
//!   file-backed and an in-memory implementation
//! - `CredentialStore`: optional OS-level password storage via keyring
//!
//! Access tokens are short-lived; `spawn_refresh_task` keeps them fresh
//! for long-running processes.

pub mod credentials;
pub mod session;
pub mod storage;

pub use credentials::CredentialStore;
pub use session::{login_error_message, spawn_refresh_task, AuthApi, Session, SessionPhase, SessionStore};
pub use storage::{keys, DurableStore, FileStore, MemoryStore};
