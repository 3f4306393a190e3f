//! Device models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device registered with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Backend primary key (UUID).
    pub id: String,
    /// Identifier the device registered itself with.
    pub device_id: String,
    pub device_type: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub last_seen: DateTime<Utc>,
    /// Only reported by the list-all endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl Device {
    /// Capabilities joined for single-line display.
    pub fn capabilities_display(&self) -> String {
        if self.capabilities.is_empty() {
            "-".to_string()
        } else {
            self.capabilities.join(", ")
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilities {
    pub device_id: String,
    pub device_type: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl DeviceCapabilities {
    pub fn supports(&self, command: &str) -> bool {
        self.capabilities.iter().any(|c| c == command)
    }
}

/// PEM public key the server uses for device registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerKey {
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectRequest<'a> {
    pub device_id: &'a str,
    pub public_key: &'a str,
}

/// Base64 ciphertext encrypted to the device's public key.
///
/// Only the device holding the private key can read the new session key,
/// so the client passes it through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReconnectResponse(pub String);
