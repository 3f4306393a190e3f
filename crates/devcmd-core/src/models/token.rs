//! Device registration tokens issued by administrators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationToken {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub is_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl RegistrationToken {
    /// Unused and not yet expired at `now`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && self.expires_at > now
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokensResponse {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub tokens: Vec<RegistrationToken>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTokenRequest<'a> {
    pub admin_key: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_parse_active_tokens() {
        let json = r#"{"count": 1, "tokens": [{"token": "9f86d081884c7d659a2feaa0c55ad015", "createdAt": "2024-05-01T10:00:00+00:00",
            "expiresAt": "2024-05-02T10:00:00+00:00", "isUsed": false, "isValid": true, "createdBy": "127.0.0.1"}]}"#;
        let resp: TokensResponse = serde_json::from_str(json).expect("parse tokens");
        assert_eq!(resp.count, Some(1));

        let token = &resp.tokens[0];
        assert_eq!(token.created_by.as_deref(), Some("127.0.0.1"));
        assert!(token.is_usable_at(token.created_at));
        assert!(!token.is_usable_at(token.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_generate_request_shape() {
        let json = serde_json::to_value(GenerateTokenRequest { admin_key: "k" }).expect("serialize");
        assert_eq!(json, serde_json::json!({"adminKey": "k"}));
    }
}
