//! Command models.
//!
//! Commands are owned by the backend. The client submits them, then reads
//! their status and result until they reach a terminal state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Sent,
    Running,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl CommandStatus {
    /// Completed and failed commands never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Sent => "sent",
            CommandStatus::Running => "running",
            CommandStatus::Completed => "completed",
            CommandStatus::Failed => "failed",
            CommandStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Result reported by the device for a finished command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, alias = "error_type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        self.status == "success" && self.error.is_none()
    }

    /// One-line summary for tables.
    pub fn summary(&self) -> String {
        if let Some(ref error) = self.error {
            return match self.error_type {
                Some(ref kind) => format!("{}: {}", kind, error),
                None => error.clone(),
            };
        }
        match self.result {
            Some(Value::String(ref s)) => s.clone(),
            Some(ref v) => v.to_string(),
            None => self.status.clone(),
        }
    }
}

/// The backend stores whatever the device sent back. Devices wrap the
/// outcome as `{"commandId", "result": {...}, "timestamp"}`; the inner
/// object is the `CommandResult`. Other objects are read directly and bare
/// values become the `result` field.
fn deserialize_result<'de, D>(deserializer: D) -> Result<Option<CommandResult>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::Object(mut map)) => {
            let raw = match map.remove("result") {
                Some(inner @ Value::Object(_)) if map.contains_key("commandId") => inner,
                Some(other) => {
                    map.insert("result".to_string(), other);
                    Value::Object(map)
                }
                None => Value::Object(map),
            };
            match serde_json::from_value::<CommandResult>(raw.clone()) {
                Ok(parsed) => Some(parsed),
                Err(_) => Some(CommandResult { result: Some(raw), ..Default::default() }),
            }
        }
        Some(other) => Some(CommandResult { result: Some(other), ..Default::default() }),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: String,
    /// Absent in the per-device history, where the device is implied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub status: CommandStatus,
    #[serde(default, deserialize_with = "deserialize_result")]
    pub result: Option<CommandResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandsResponse {
    #[serde(default)]
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandExecutionRequest<'a> {
    pub device_id: &'a str,
    pub command: &'a str,
    pub params: &'a Map<String, Value>,
}

/// Acknowledgement returned when a command is queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReceipt {
    pub status: String,
    pub command_id: String,
}
