//! Application state for the command-line front-end.
//!
//! `App` is built once per process: it owns the configuration, the API
//! client and the session store, and runs each subcommand against them.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use devcmd_core::auth::{spawn_refresh_task, CredentialStore, FileStore};
use devcmd_core::models::{
    ActionSchema, Command, CommandStatus, Credentials, Registration, RegistrationOutcome,
};
use devcmd_core::{ApiClient, ApiError, Config, SessionStore};

use crate::cli::Commands;
use crate::output;

type Store = SessionStore<ApiClient, FileStore>;

pub struct App {
    pub config: Config,
    api: ApiClient,
    session: Arc<Mutex<Store>>,
    json: bool,
}

impl App {
    /// Create the application and restore any stored session
    pub async fn new(config: Config, json: bool) -> Result<Self> {
        let api = ApiClient::new(&config)?;

        let cache_dir = config.cache_dir()?;
        debug!(?cache_dir, "Cache directory configured");
        let storage = FileStore::open(&cache_dir)?;

        // Shares the default bearer token with `api`
        let mut store = SessionStore::new(api.clone(), storage);
        let restored = store.restore().await;
        debug!(restored, "Session restore finished");

        Ok(Self {
            config,
            api,
            session: Arc::new(Mutex::new(store)),
            json,
        })
    }

    pub async fn run(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Login { email, remember } => self.login(email, remember).await,
            Commands::Logout { forget_password } => self.logout(forget_password).await,
            Commands::Register { email, name } => self.register(email, name).await,
            Commands::Whoami => self.whoami().await,
            Commands::Devices { all } => {
                let devices = if all {
                    self.api.list_all_devices().await?
                } else {
                    self.api.list_devices().await?
                };
                output::devices(&devices, self.json)
            }
            Commands::Device { device_id } => {
                let (capabilities, commands) = tokio::try_join!(
                    self.api.device_capabilities(&device_id),
                    self.api.device_commands(&device_id),
                )?;
                output::device_detail(&capabilities, &commands, self.json)
            }
            Commands::Actions { name } => {
                let schema = self.api.action_parameters(&name).await?;
                output::action_schema(&schema, self.json)
            }
            Commands::Exec { device_id, command, params, wait, poll_secs, max_polls } => {
                self.exec(&device_id, &command, &params, wait.then_some((poll_secs, max_polls)))
                    .await
            }
            Commands::Status { command_ids } => {
                let mut commands = Vec::with_capacity(command_ids.len());
                for (id, result) in command_ids.iter().zip(self.api.command_statuses(&command_ids).await) {
                    commands.push(result.with_context(|| format!("Failed to fetch command {}", id))?);
                }
                output::commands(&commands, self.json)
            }
            Commands::Commands => {
                let commands = self.api.list_commands().await?;
                output::commands(&commands, self.json)
            }
            Commands::Tokens { generate, admin_key } => {
                if generate {
                    let admin_key = match admin_key {
                        Some(key) => key,
                        None => rpassword::prompt_password("Admin key: ")?,
                    };
                    let token = self.api.generate_token(&admin_key).await?;
                    output::generated_token(&token, self.json)
                } else {
                    let tokens = self.api.list_tokens().await?;
                    output::tokens(&tokens, self.json)
                }
            }
            Commands::ServerKey => {
                let key = self.api.server_public_key().await?;
                output::server_key(&key, self.json)
            }
            Commands::Reconnect { device_id, public_key_file } => {
                let public_key = std::fs::read_to_string(&public_key_file)
                    .with_context(|| format!("Failed to read {}", public_key_file.display()))?;
                let response = self.api.reconnect_device(&device_id, &public_key).await?;
                output::reconnect(&device_id, &response, self.json)
            }
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    async fn login(&mut self, email: Option<String>, remember: bool) -> Result<()> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt("Email: ")?,
        };
        if email.is_empty() {
            anyhow::bail!("Email required");
        }

        let password = match std::env::var("DEVCMD_PASSWORD") {
            Ok(password) if !password.is_empty() => password,
            _ => Self::password_for(&email)?,
        };

        let credentials = Credentials::new(email.clone(), password);
        let mut store = self.session.lock().await;
        if let Err(e) = store.login(&credentials).await {
            let message = store.error().unwrap_or("Login failed").to_string();
            return Err(e.context(message));
        }
        if !store.is_authenticated() {
            anyhow::bail!("Login succeeded but the session could not be established");
        }

        if remember {
            if let Err(e) = CredentialStore::store(&email, &credentials.password) {
                warn!(error = %e, "Failed to store credentials");
            }
        }

        self.config.last_email = Some(email);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        output::session(store.session(), self.json)
    }

    /// Offer the remembered password if there is one, else prompt
    fn password_for(email: &str) -> Result<String> {
        if CredentialStore::has_credentials(email) {
            let answer = prompt("Use stored password? [Y/n]: ")?;
            if answer.to_lowercase() != "n" {
                return CredentialStore::get_password(email);
            }
        }
        Ok(rpassword::prompt_password("Password: ")?)
    }

    async fn logout(&mut self, forget_password: bool) -> Result<()> {
        let mut store = self.session.lock().await;
        let email = store.session().email.clone().or_else(|| self.config.last_email.clone());
        store.logout();

        if forget_password {
            if let Some(ref email) = email {
                if let Err(e) = CredentialStore::delete(email) {
                    warn!(error = %e, "Failed to delete stored password");
                }
            }
        }

        if !self.json {
            println!("Logged out.");
        }
        Ok(())
    }

    async fn register(&mut self, email: String, name: String) -> Result<()> {
        let password1 = rpassword::prompt_password("Password: ")?;
        let password2 = rpassword::prompt_password("Confirm password: ")?;

        let registration = Registration { email, name, password1, password2 };
        let outcome = self.api.register(&registration).await?;
        output::registration(&outcome, self.json)?;

        match outcome {
            RegistrationOutcome::Created => Ok(()),
            RegistrationOutcome::Rejected { .. } => anyhow::bail!("Registration rejected"),
        }
    }

    async fn whoami(&self) -> Result<()> {
        let store = self.session.lock().await;
        if !store.is_authenticated() {
            anyhow::bail!("Not logged in");
        }
        output::session(store.session(), self.json)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn exec(
        &self,
        device_id: &str,
        command: &str,
        raw_params: &[String],
        wait: Option<(u64, u32)>,
    ) -> Result<()> {
        let (capabilities, schema) = tokio::try_join!(
            self.api.device_capabilities(device_id),
            self.api.action_parameters(command),
        )?;
        if !capabilities.supports(command) {
            anyhow::bail!(
                "Device {} does not support {} (capabilities: {})",
                device_id,
                command,
                capabilities.capabilities.join(", ")
            );
        }
        let params = build_params(&schema, raw_params)?;

        let receipt = self.api.execute_command(device_id, command, &params).await?;
        info!(command_id = %receipt.command_id, "Command queued");

        let Some((poll_secs, max_polls)) = wait else {
            return output::receipt(&receipt, self.json);
        };

        // Polling can outlive an access token
        let refresher = spawn_refresh_task(
            Arc::clone(&self.session),
            Duration::from_secs(self.config.refresh_interval_secs.max(1)),
        );
        let result = self
            .api
            .wait_for_command(&receipt.command_id, Duration::from_secs(poll_secs), max_polls)
            .await;
        refresher.abort();

        let command = result?;
        if !command.status.is_terminal() {
            warn!(command_id = %command.id, status = %command.status, "Gave up waiting for command");
        }
        output::commands(std::slice::from_ref(&command), self.json)?;
        check_outcome(&command)
    }
}

/// Turn `key=value` arguments into a parameter map typed by the action schema.
fn build_params(schema: &ActionSchema, raw: &[String]) -> Result<Map<String, Value>> {
    let mut params = Map::new();
    for arg in raw {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Parameter `{}` is not in key=value form", arg))?;
        let value = match schema.parameter(key) {
            Some(param) => param.coerce(value),
            None => Value::String(value.to_string()),
        };
        params.insert(key.to_string(), value);
    }

    let missing = schema.missing_required(&params);
    if !missing.is_empty() {
        anyhow::bail!("Missing required parameters for {}: {}", schema.action, missing.join(", "));
    }
    Ok(params)
}

/// True when the backend rejected the request for lack of a valid session.
pub fn needs_login(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<ApiError>().is_some_and(ApiError::is_auth_failure))
}

/// Fail when a finished command did not succeed on the device.
fn check_outcome(command: &Command) -> Result<()> {
    let failed = match command.status {
        CommandStatus::Failed => true,
        CommandStatus::Completed => command.result.as_ref().is_some_and(|r| !r.is_success()),
        _ => false,
    };
    if failed {
        let reason = command.result.as_ref().map(|r| r.summary()).unwrap_or_default();
        anyhow::bail!("Command {} failed: {}", command.id, reason);
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
