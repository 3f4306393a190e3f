//! API client for communicating with the device command backend.
//!
//! This module provides the `ApiClient` struct. Each method maps one
//! backend endpoint to one HTTP request and returns the parsed response.
//! There are no retries and no caching; errors go straight to the caller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{header, Client, Url};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::auth::AuthApi;
use crate::config::{ApiPaths, Config};
use crate::models::{
    AccessToken, ActionSchema, Command, CommandExecutionRequest, CommandReceipt, CommandsResponse,
    Credentials, Device, DeviceCapabilities, DevicesResponse, GenerateTokenRequest, GeneratedToken,
    ReconnectRequest, ReconnectResponse, RefreshRequest, Registration, RegistrationOutcome,
    RegistrationToken, ServerKey, TokenPair, TokensResponse, UserProfile,
};

use super::ApiError;

/// API client for the device command backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling,
/// and clones share the default bearer token.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    paths: Arc<ApiPaths>,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    /// Create a new API client from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.api_base_url)
            .with_context(|| format!("Invalid API base URL: {}", config.api_base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL cannot carry a path: {}", config.api_base_url);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            paths: Arc::new(config.api_paths()),
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Set the default bearer token for authenticated requests.
    /// Visible to every clone of this client.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    /// Resolve a path template against the base URL.
    /// Placeholders like `{id}` are replaced by the matching argument,
    /// percent-encoded as a single path segment.
    fn endpoint(&self, template: &str, args: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("API base URL cannot carry a path"))?;
            segments.pop_if_empty();
            for segment in template.trim_start_matches('/').split('/') {
                let value = segment
                    .strip_prefix('{')
                    .and_then(|s| s.strip_suffix('}'))
                    .and_then(|key| args.iter().find(|(k, _)| *k == key).map(|(_, v)| *v));
                segments.push(value.unwrap_or(segment));
            }
        }
        Ok(url)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = *self.token.read() {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(%status, "Request failed");
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, url: &Url) -> Result<T> {
        let response = Self::check_response(response).await?;
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("{} from {}", e, url.path())).into()
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .headers(self.auth_headers()?)
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send GET request to {}", url))?;
        Self::parse(response, &url).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<T> {
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(url.clone())
            .headers(self.auth_headers()?)
            .json(body)
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send POST request to {}", url))?;
        Self::parse(response, &url).await
    }

    // ===== Authentication =====

    /// Exchange credentials for an access/refresh pair
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenPair> {
        let url = self.endpoint(&self.paths.login, &[])?;
        self.post(url, credentials).await
    }

    /// Create a new account
    pub async fn register(&self, registration: &Registration) -> Result<RegistrationOutcome> {
        let url = self.endpoint(&self.paths.register, &[])?;
        self.post(url, registration).await
    }

    /// Fetch the profile of the user owning `access_token`.
    /// The token is sent explicitly, independent of the default credential.
    pub async fn me(&self, access_token: &str) -> Result<UserProfile> {
        let url = self.endpoint(&self.paths.me, &[])?;
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(ApiError::from)
            .context("Failed to fetch current user")?;
        Self::parse(response, &url).await
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessToken> {
        let url = self.endpoint(&self.paths.refresh, &[])?;
        self.post(url, &RefreshRequest { refresh: refresh_token }).await
    }

    // ===== Devices =====

    /// Fetch active devices
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let url = self.endpoint(&self.paths.devices, &[])?;
        let response: DevicesResponse = self.get(url).await?;
        Ok(response.devices)
    }

    /// Fetch every registered device, including inactive ones
    pub async fn list_all_devices(&self) -> Result<Vec<Device>> {
        let url = self.endpoint(&self.paths.all_devices, &[])?;
        let response: DevicesResponse = self.get(url).await?;
        Ok(response.devices)
    }

    pub async fn device_capabilities(&self, device_id: &str) -> Result<DeviceCapabilities> {
        let url = self.endpoint(&self.paths.device_capabilities, &[("id", device_id)])?;
        self.get(url).await
    }

    /// Fetch the command history of one device, most recent first
    pub async fn device_commands(&self, device_id: &str) -> Result<Vec<Command>> {
        let url = self.endpoint(&self.paths.device_commands, &[("id", device_id)])?;
        let response: CommandsResponse = self.get(url).await?;
        Ok(response.commands)
    }

    /// Ask the backend to issue a new session key to a known device.
    /// The response is encrypted to `public_key` and returned as-is.
    pub async fn reconnect_device(&self, device_id: &str, public_key: &str) -> Result<ReconnectResponse> {
        let url = self.endpoint(&self.paths.reconnect_device, &[])?;
        self.post(url, &ReconnectRequest { device_id, public_key }).await
    }

    // ===== Actions and Commands =====

    pub async fn action_parameters(&self, action: &str) -> Result<ActionSchema> {
        let url = self.endpoint(&self.paths.action_parameters, &[("name", action)])?;
        self.get(url).await
    }

    /// Queue a command for a device
    pub async fn execute_command(
        &self,
        device_id: &str,
        command: &str,
        params: &Map<String, Value>,
    ) -> Result<CommandReceipt> {
        let url = self.endpoint(&self.paths.execute_command, &[])?;
        let body = CommandExecutionRequest { device_id, command, params };
        self.post(url, &body).await
    }

    pub async fn command_status(&self, command_id: &str) -> Result<Command> {
        let url = self.endpoint(&self.paths.command_status, &[("id", command_id)])?;
        self.get(url).await
    }

    /// Fetch several command statuses concurrently, one result per id in order
    pub async fn command_statuses(&self, command_ids: &[String]) -> Vec<Result<Command>> {
        let futures = command_ids.iter().map(|id| self.command_status(id));
        futures::future::join_all(futures).await
    }

    /// Poll a command until it completes or fails.
    /// Returns the last status seen; it is not terminal if `max_polls` ran out.
    pub async fn wait_for_command(&self, command_id: &str, interval: Duration, max_polls: u32) -> Result<Command> {
        let mut polls = 0;
        loop {
            let command = self.command_status(command_id).await?;
            polls += 1;
            if command.status.is_terminal() || polls >= max_polls.max(1) {
                return Ok(command);
            }
            debug!(command_id, status = %command.status, polls, "Command still in flight");
            tokio::time::sleep(interval).await;
        }
    }

    /// Fetch command history across all devices
    pub async fn list_commands(&self) -> Result<Vec<Command>> {
        let url = self.endpoint(&self.paths.commands, &[])?;
        let response: CommandsResponse = self.get(url).await?;
        Ok(response.commands)
    }

    // ===== Administration =====

    /// Issue a one-time device registration token
    pub async fn generate_token(&self, admin_key: &str) -> Result<GeneratedToken> {
        let url = self.endpoint(&self.paths.generate_token, &[])?;
        self.post(url, &GenerateTokenRequest { admin_key }).await
    }

    /// Fetch unused, unexpired registration tokens
    pub async fn list_tokens(&self) -> Result<Vec<RegistrationToken>> {
        let url = self.endpoint(&self.paths.tokens, &[])?;
        let response: TokensResponse = self.get(url).await?;
        Ok(response.tokens)
    }

    pub async fn server_public_key(&self) -> Result<ServerKey> {
        let url = self.endpoint(&self.paths.server_key, &[])?;
        self.get(url).await
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, credentials: &Credentials) -> Result<TokenPair> {
        ApiClient::login(self, credentials).await
    }

    async fn me(&self, access_token: &str) -> Result<UserProfile> {
        ApiClient::me(self, access_token).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AccessToken> {
        ApiClient::refresh(self, refresh_token).await
    }

    fn set_default_token(&self, token: Option<&str>) {
        self.set_token(token.map(str::to_string));
    }
}
