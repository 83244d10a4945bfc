//! CLI parsing and command execution
//!
//! This module handles command-line argument parsing and routes commands to the appropriate handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info};

use pam_pg_connector::config::Config;
use pam_pg_connector::descriptor::ResolvedAccount;
use pam_pg_connector::request::{self, Operation, TargetAccount};
use pam_pg_connector::rotation::{self, CredentialExecutor, OperationReport};
use pam_pg_connector::targets::PostgresConnector;

#[derive(Parser)]
#[command(name = "pampg")]
#[command(about = "Verify and rotate PostgreSQL account passwords for a PAM controller", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "PAMPG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Driver log level: OFF, DEBUG or TRACE (overrides config file)
    #[arg(long, env = "PAMPG_DRIVER_LOGLEVEL")]
    pub driver_log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a sample configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "pampg.toml")]
        output: PathBuf,
    },

    /// Verify that an account authenticates with its password
    Verify {
        /// JSON account request ("-" reads standard input)
        #[arg(short, long, default_value = "-")]
        request: PathBuf,
    },

    /// Change an account's password to the password in the request
    Rotate {
        /// JSON account request ("-" reads standard input)
        #[arg(short, long, default_value = "-")]
        request: PathBuf,

        /// Replace the requested password with a generated one
        #[arg(long)]
        generate: bool,

        /// Length of the generated password
        #[arg(short, long, default_value = "32")]
        length: usize,

        /// Characters the generated password is drawn from
        #[arg(long, default_value = rotation::DEFAULT_SECRET_CHARSET)]
        charset: String,
    },
}

/// Load configuration: file if given, environment otherwise, CLI overrides last
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(ref config_path) = cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        Config::from_env()
    };

    if let Some(ref level) = cli.driver_log_level {
        config.driver.log_level = level.clone();
    }

    Ok(config)
}

/// Execute a CLI command
pub async fn execute(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Init { output } => {
            Config::create_sample(&output)
                .with_context(|| format!("Failed to create sample config at {:?}", output))?;
            info!("Sample configuration created at {:?}", output);
        }

        Commands::Verify { request } => {
            let account = read_request(&request)?;
            run(Operation::Verify, &account, &config).await?;
        }

        Commands::Rotate {
            request,
            generate,
            length,
            charset,
        } => {
            let mut account = read_request(&request)?;
            if generate {
                account.password = rotation::generate_secret(length, &charset)
                    .context("Password charset must not be empty")?;
            }

            run(Operation::Rotate, &account, &config).await?;

            if generate {
                eprintln!("WARNING: Secret value will be displayed. Ensure this output is secured.");
                eprintln!("New password: {}", account.password.expose_secret());
            }
        }
    }

    Ok(())
}

fn read_request(path: &Path) -> Result<TargetAccount> {
    let json = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file: {:?}", path))?
    };

    TargetAccount::from_json(&json).context("Failed to parse account request")
}

/// Validate, resolve and execute one operation, printing the JSON report
async fn run(operation: Operation, account: &TargetAccount, config: &Config) -> Result<()> {
    let started = Instant::now();

    let report = match request::validate(account, operation) {
        Err(e) => {
            error!("Failed to parse credential {} request: {}", operation.name(), e);
            OperationReport::rejected(&e)
        }
        Ok(()) => {
            let resolved = ResolvedAccount::resolve(account);
            let executor = CredentialExecutor::new(Box::new(PostgresConnector::new()), config);
            let result = match operation {
                Operation::Verify => executor.verify(&resolved).await,
                Operation::Rotate => executor.rotate(&resolved).await,
            };

            if result.is_err() {
                let application = &account.target_application;
                error!(
                    "Failed to {} credentials for user: '{}' on device: '{}' with targetApplicationName: '{}'.",
                    operation.name(),
                    account.user_name,
                    application.target_server.device_name,
                    application.name
                );
            }
            OperationReport::from(&result)
        }
    };

    info!("{}", duration_message(operation, report.success, started.elapsed(), account));
    println!(
        "{}",
        serde_json::to_string(&report).context("Failed to serialize report")?
    );

    if !report.success {
        anyhow::bail!(
            "Credential {} failed: {}",
            operation.name(),
            report.code.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

fn duration_message(
    operation: Operation,
    success: bool,
    elapsed: Duration,
    account: &TargetAccount,
) -> String {
    let mut message = String::from("Duration of ");
    if !success {
        message.push_str("failed ");
    }
    message.push_str("call to ");
    message.push_str(operation.name());

    let application = &account.target_application;
    let device = &application.target_server.device_name;
    if !account.user_name.is_empty() && !device.is_empty() && !application.name.is_empty() {
        message.push_str(&format!(
            " for username: '{}' on the device: '{}' with applicationName: '{}'",
            account.user_name, device, application.name
        ));
    }

    message.push_str(&format!(" = {} ms.", elapsed.as_millis()));
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use pam_pg_connector::request::{TargetApplication, TargetServer};

    #[test]
    fn test_parse_rotate_command() {
        let cli = Cli::try_parse_from([
            "pampg",
            "--driver-log-level",
            "DEBUG",
            "rotate",
            "--request",
            "req.json",
            "--generate",
        ])
        .unwrap();

        match cli.command {
            Commands::Rotate {
                request,
                generate,
                length,
                charset,
            } => {
                assert_eq!(request, PathBuf::from("req.json"));
                assert!(generate);
                assert_eq!(length, 32);
                assert_eq!(charset, rotation::DEFAULT_SECRET_CHARSET);
            }
            _ => panic!("expected rotate"),
        }
    }

    #[test]
    fn test_cli_overrides_log_level() {
        let cli = Cli::try_parse_from(["pampg", "--driver-log-level", "TRACE", "verify"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.driver.log_level, "TRACE");
    }

    #[test]
    fn test_read_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.json");
        std::fs::write(&path, r#"{"userName": "svc", "password": "p@ss"}"#).unwrap();

        let account = read_request(&path).unwrap();
        assert_eq!(account.user_name, "svc");
        assert!(read_request(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_duration_message() {
        let account = TargetAccount {
            user_name: "svc".to_string(),
            target_application: TargetApplication {
                name: "orders-db".to_string(),
                target_server: TargetServer {
                    host_name: "db.example.com".to_string(),
                    device_name: "db01".to_string(),
                },
                ..TargetApplication::default()
            },
            ..TargetAccount::default()
        };

        assert_eq!(
            duration_message(Operation::Verify, true, Duration::from_millis(42), &account),
            "Duration of call to verify for username: 'svc' on the device: 'db01' with applicationName: 'orders-db' = 42 ms."
        );
        assert_eq!(
            duration_message(
                Operation::Rotate,
                false,
                Duration::from_millis(7),
                &TargetAccount::default()
            ),
            "Duration of failed call to rotate = 7 ms."
        );
    }
}
