//! Account models: login, token refresh, profile and sign-up.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Login credentials. The password is never printed.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Access/refresh pair returned by the login endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair").finish_non_exhaustive()
    }
}

/// New access token returned by the refresh endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AccessToken {
    pub access: String,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// User ids are UUIDs on current backends and integers on older ones.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unexpected user id: {}", other))),
    }
}

/// The current user, as reported by `/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_staff: bool,
}

/// Sign-up form. The backend validates everything, including that the two
/// passwords match.
#[derive(Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub name: String,
    pub password1: String,
    pub password2: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Outcome of a sign-up request.
///
/// The backend answers 200 either way and signals rejection through the
/// `message` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum RegistrationOutcome {
    Created,
    Rejected { errors: BTreeMap<String, Vec<String>> },
}

#[derive(Deserialize)]
struct RawRegistrationResponse {
    message: String,
    #[serde(default)]
    errors: BTreeMap<String, Vec<String>>,
}

impl<'de> Deserialize<'de> for RegistrationOutcome {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawRegistrationResponse::deserialize(deserializer)?;
        if raw.message == "success" {
            Ok(RegistrationOutcome::Created)
        } else {
            Ok(RegistrationOutcome::Rejected { errors: raw.errors })
        }
    }
}

impl RegistrationOutcome {
    /// Field errors flattened to `field: message` lines.
    pub fn error_lines(&self) -> Vec<String> {
        match self {
            RegistrationOutcome::Created => Vec::new(),
            RegistrationOutcome::Rejected { errors } => errors
                .iter()
                .flat_map(|(field, messages)| messages.iter().map(move |m| format!("{}: {}", field, m)))
                .collect(),
        }
    }
}
