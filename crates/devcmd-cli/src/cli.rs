//! Command-line surface. Each subcommand stands in for one screen of the
//! web front-end.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "devcmd", version, about = "Manage devices and run commands on them")]
pub struct Cli {
    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Backend base URL (overrides the config file)
    #[arg(long, global = true, env = "DEVCMD_API_URL")]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Log in and store the session
    Login {
        #[arg(long, env = "DEVCMD_EMAIL")]
        email: Option<String>,
        /// Remember the password in the OS keychain
        #[arg(long)]
        remember: bool,
    },
    /// Forget the stored session
    Logout {
        /// Also delete the remembered password
        #[arg(long)]
        forget_password: bool,
    },
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
    /// Show the logged-in user
    Whoami,
    /// List devices
    Devices {
        /// Include inactive devices
        #[arg(long)]
        all: bool,
    },
    /// Show a device's capabilities and command history
    Device { device_id: String },
    /// Show the parameters an action expects
    Actions { name: String },
    /// Queue a command on a device
    Exec {
        device_id: String,
        command: String,
        /// Parameters as key=value
        params: Vec<String>,
        /// Poll until the command completes or fails
        #[arg(long)]
        wait: bool,
        #[arg(long, default_value_t = 2)]
        poll_secs: u64,
        #[arg(long, default_value_t = 30)]
        max_polls: u32,
    },
    /// Show the status of one or more commands
    Status {
        #[arg(required = true)]
        command_ids: Vec<String>,
    },
    /// Show command history across all devices
    Commands,
    /// List active registration tokens, or issue one
    Tokens {
        #[arg(long)]
        generate: bool,
        #[arg(long, env = "DEVCMD_ADMIN_KEY", hide_env_values = true)]
        admin_key: Option<String>,
    },
    /// Print the server's public key
    ServerKey,
    /// Request a new session key for a registered device
    Reconnect {
        device_id: String,
        #[arg(long)]
        public_key_file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_exec_with_params() {
        let cli = Cli::try_parse_from(["devcmd", "exec", "calc-01", "add", "num1=2", "num2=3", "--wait"]).unwrap();
        match cli.command {
            Commands::Exec { device_id, command, params, wait, poll_secs, .. } => {
                assert_eq!(device_id, "calc-01");
                assert_eq!(command, "add");
                assert_eq!(params, vec!["num1=2", "num2=3"]);
                assert!(wait);
                assert_eq!(poll_secs, 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_status_requires_an_id() {
        assert!(Cli::try_parse_from(["devcmd", "status"]).is_err());
    }
}
