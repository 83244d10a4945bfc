use rand::distributions::Slice;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::{Config, DriverLogLevel};
use crate::descriptor::{ConnectParams, LoginIdentity, ResolvedAccount};
use crate::error::{
    CredentialError, DriverError, ErrorClassifier, ErrorKind, FailureContext, RequestError,
};
use crate::targets::{Connector, ConnectorInstance};

/// Outcome of one VERIFY or ROTATE
pub type OperationResult = Result<(), CredentialError>;

/// Response sent back to the PAM controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

impl OperationReport {
    /// Report for a request that failed validation
    pub fn rejected(e: &RequestError) -> Self {
        match e {
            RequestError::MissingArguments(missing) => Self {
                success: false,
                code: Some("MISSING_ARGUMENTS".to_string()),
                kind: None,
                args: Some(missing.iter().map(|s| s.to_string()).collect()),
            },
        }
    }
}

impl From<&OperationResult> for OperationReport {
    fn from(result: &OperationResult) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                code: None,
                kind: None,
                args: None,
            },
            Err(e) => Self {
                success: false,
                code: Some(e.kind.code().to_string()),
                kind: Some(e.kind),
                args: Some(e.args.clone()),
            },
        }
    }
}

/// Build the password change statement for `username`.
///
/// Single quotes in the password are doubled; the statement text is otherwise fixed.
pub fn alter_password_statement(username: &str, new_password: &SecretString) -> String {
    format!(
        "ALTER USER \"{}\" PASSWORD E'{}'",
        username,
        new_password.expose_secret().replace('\'', "''")
    )
}

/// Characters `--generate` draws from. No quotes or backslashes.
pub const DEFAULT_SECRET_CHARSET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*-_=+";

/// Generate a random password of `length` characters drawn uniformly from `charset`.
///
/// Returns `None` for an empty charset.
pub fn generate_secret(length: usize, charset: &str) -> Option<SecretString> {
    let chars: Vec<char> = charset.chars().collect();
    let dist = Slice::new(&chars).ok()?;
    let secret: String = rand::thread_rng().sample_iter(dist).take(length).collect();
    Some(SecretString::from(secret))
}

/// Runs credential operations against the target server
pub struct CredentialExecutor {
    connector: ConnectorInstance,
    classifier: ErrorClassifier,
    log_level: DriverLogLevel,
}

impl CredentialExecutor {
    pub fn new(connector: ConnectorInstance, config: &Config) -> Self {
        Self {
            connector,
            classifier: ErrorClassifier::new(config.classification.clone()),
            log_level: config.driver_log_level(),
        }
    }

    fn params(&self, account: &ResolvedAccount, login: LoginIdentity<'_>) -> ConnectParams {
        account.descriptor.connect_params(login, self.log_level)
    }

    fn classify(
        &self,
        account: &ResolvedAccount,
        login: LoginIdentity<'_>,
        e: &DriverError,
    ) -> CredentialError {
        let descriptor = &account.descriptor;
        let err = self.classifier.classify(
            e,
            &FailureContext {
                username: &descriptor.username,
                login_username: login.username,
                hostname: &descriptor.hostname,
                port: descriptor.port,
            },
        );
        error!(
            "{} user '{}': {} (login as '{}'): {}",
            self.connector.connector_type(),
            descriptor.username,
            err.kind,
            login.username,
            e
        );
        err
    }

    /// Check that the account authenticates with its previous password.
    ///
    /// Opens one session and closes it again; nothing is executed.
    pub async fn verify(&self, account: &ResolvedAccount) -> OperationResult {
        let login = account.verify_identity();
        let params = self.params(account, login);
        let username = &account.descriptor.username;

        match self.connector.connect(&params).await {
            Ok(session) => {
                session.close().await;
                info!("PostgreSQL DB user '{}' password verified - OK", username);
                Ok(())
            }
            Err(e) => {
                info!("PostgreSQL DB user '{}' password verified - Not OK", username);
                Err(self.classify(account, login, &e))
            }
        }
    }

    /// Change the account's password to its current password.
    ///
    /// Logs in as the account itself or as the master account, then runs the
    /// `ALTER USER` statement in a single committed transaction.
    pub async fn rotate(&self, account: &ResolvedAccount) -> OperationResult {
        let login = account.rotate_identity();
        let params = self.params(account, login);
        let descriptor = &account.descriptor;

        debug!(
            "Rotating password for '{}' as '{}' (master: {})",
            descriptor.username,
            login.username,
            account.delegation.is_master()
        );

        let outcome = match self.connector.connect(&params).await {
            Ok(mut session) => {
                debug!(
                    "Executing: ALTER USER \"{}\" PASSWORD E'<hidden>'",
                    descriptor.username
                );
                let statement =
                    alter_password_statement(&descriptor.username, &descriptor.current_password);
                let executed = session.execute_in_transaction(&statement).await;
                session.close().await;
                executed
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!("PostgreSQL DB user '{}' password updated - OK", descriptor.username);
                Ok(())
            }
            Err(e) => {
                info!("PostgreSQL DB user '{}' password updated - Not OK", descriptor.username);
                Err(self.classify(account, login, &e))
            }
        }
    }
}
