//! Data models for the device command backend.
//!
//! This module contains the request and response structures exchanged
//! with the backend:
//!
//! - `Device`, `DeviceCapabilities`: registered devices
//! - `Command`, `CommandResult`, `CommandStatus`: dispatched work and results
//! - `ActionSchema`, `ActionParameter`: parameter schema for a named action
//! - `RegistrationToken`, `GeneratedToken`: admin-issued device tokens
//! - `UserProfile`, `TokenPair`, `RegistrationOutcome`: account endpoints

pub mod action;
pub mod command;
pub mod device;
pub mod token;
pub mod user;

pub use action::{ActionParameter, ActionSchema, ParameterType};
pub use command::{
    Command, CommandExecutionRequest, CommandReceipt, CommandResult, CommandStatus, CommandsResponse,
};
pub use device::{Device, DeviceCapabilities, DevicesResponse, ReconnectRequest, ReconnectResponse, ServerKey};
pub use token::{GenerateTokenRequest, GeneratedToken, RegistrationToken, TokensResponse};
pub use user::{
    AccessToken, Credentials, RefreshRequest, Registration, RegistrationOutcome, TokenPair, UserProfile,
};
