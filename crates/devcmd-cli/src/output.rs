//! Rendering of API results as plain tables or JSON.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use devcmd_core::models::{
    ActionSchema, Command, CommandReceipt, Device, DeviceCapabilities, GeneratedToken, ReconnectResponse,
    RegistrationOutcome, RegistrationToken, ServerKey,
};
use devcmd_core::Session;

/// Width of the free-form result column
const RESULT_COLUMN_WIDTH: usize = 40;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Relative age of a timestamp, e.g. "5m ago"
pub fn age_display(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - at).num_minutes();
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        format!("{}h ago", minutes / 60)
    } else {
        format!("{}d ago", minutes / 1440)
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn devices(devices: &[Device], json: bool) -> Result<()> {
    if json {
        return print_json(devices);
    }
    if devices.is_empty() {
        println!("No devices.");
        return Ok(());
    }

    let now = Utc::now();
    println!("{:<24} {:<16} {:<12} CAPABILITIES", "DEVICE", "TYPE", "LAST SEEN");
    for device in devices {
        let mut last_seen = age_display(device.last_seen, now);
        if device.is_active == Some(false) {
            last_seen.push_str(" (inactive)");
        }
        println!(
            "{:<24} {:<16} {:<12} {}",
            device.device_id,
            device.device_type,
            last_seen,
            device.capabilities_display()
        );
    }
    Ok(())
}

pub fn device_detail(capabilities: &DeviceCapabilities, history: &[Command], json: bool) -> Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "device": capabilities,
            "commands": history,
        }));
    }

    println!("Device:       {}", capabilities.device_id);
    println!("Type:         {}", capabilities.device_type);
    println!("Capabilities: {}", capabilities.capabilities.join(", "));
    if let Some(last_seen) = capabilities.last_seen {
        println!("Last seen:    {}", age_display(last_seen, Utc::now()));
    }
    println!();
    commands(history, false)
}

pub fn action_schema(schema: &ActionSchema, json: bool) -> Result<()> {
    if json {
        return print_json(schema);
    }

    println!("{}", schema.action);
    if let Some(ref description) = schema.description {
        println!("  {}", description);
    }
    for param in &schema.parameters {
        println!(
            "  {:<16} {:<8} {}",
            param.name,
            param.kind.as_str(),
            if param.required { "required" } else { "optional" }
        );
    }
    Ok(())
}

pub fn receipt(receipt: &CommandReceipt, json: bool) -> Result<()> {
    if json {
        return print_json(receipt);
    }
    println!("{} ({})", receipt.command_id, receipt.status);
    Ok(())
}

pub fn commands(commands: &[Command], json: bool) -> Result<()> {
    if json {
        return print_json(commands);
    }
    if commands.is_empty() {
        println!("No commands.");
        return Ok(());
    }

    println!(
        "{:<36} {:<16} {:<16} {:<10} {:<19} RESULT",
        "ID", "DEVICE", "COMMAND", "STATUS", "CREATED"
    );
    for command in commands {
        let result = command
            .result
            .as_ref()
            .map(|r| truncate_string(&r.summary(), RESULT_COLUMN_WIDTH))
            .unwrap_or_default();
        println!(
            "{:<36} {:<16} {:<16} {:<10} {:<19} {}",
            command.id,
            command.device_id.as_deref().unwrap_or("-"),
            command.name,
            command.status,
            format_timestamp(command.created_at),
            result
        );
    }
    Ok(())
}

pub fn tokens(tokens: &[RegistrationToken], json: bool) -> Result<()> {
    if json {
        return print_json(tokens);
    }
    if tokens.is_empty() {
        println!("No active tokens.");
        return Ok(());
    }

    let now = Utc::now();
    println!("{:<34} {:<19} {:<19} USABLE", "TOKEN", "CREATED", "EXPIRES");
    for token in tokens {
        println!(
            "{:<34} {:<19} {:<19} {}",
            token.token,
            format_timestamp(token.created_at),
            format_timestamp(token.expires_at),
            if token.is_usable_at(now) { "yes" } else { "no" }
        );
    }
    Ok(())
}

pub fn generated_token(token: &GeneratedToken, json: bool) -> Result<()> {
    if json {
        return print_json(token);
    }
    println!("{}", token.token);
    println!("Expires {}", format_timestamp(token.expires_at));
    Ok(())
}

pub fn server_key(key: &ServerKey, json: bool) -> Result<()> {
    if json {
        return print_json(key);
    }
    println!("{}", key.public_key.trim_end());
    Ok(())
}

pub fn reconnect(device_id: &str, response: &ReconnectResponse, json: bool) -> Result<()> {
    if json {
        return print_json(&serde_json::json!({ "deviceId": device_id, "data": response }));
    }
    println!("Reconnected {}. Encrypted session payload:", device_id);
    println!("{}", response.0);
    Ok(())
}

pub fn registration(outcome: &RegistrationOutcome, json: bool) -> Result<()> {
    if json {
        return print_json(outcome);
    }
    match outcome {
        RegistrationOutcome::Created => println!("Account created. Run `devcmd login` to sign in."),
        RegistrationOutcome::Rejected { .. } => {
            eprintln!("Registration rejected:");
            for line in outcome.error_lines() {
                eprintln!("  {}", line);
            }
        }
    }
    Ok(())
}

pub fn session(session: &Session, json: bool) -> Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "isAuthenticated": session.is_authenticated,
            "id": session.user_id,
            "email": session.email,
            "name": session.display_name,
            "isStaff": session.is_privileged,
        }));
    }

    let who = session
        .display_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .or(session.email.as_deref())
        .unwrap_or("unknown user");
    println!(
        "Logged in as {}{}",
        who,
        if session.is_privileged { " (staff)" } else { "" }
    );
    if let (Some(email), Some(_)) = (session.email.as_deref(), session.display_name.as_deref()) {
        println!("Email: {}", email);
    }
    Ok(())
}
