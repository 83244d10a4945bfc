//! Error taxonomy and driver error classification
//!
//! Every failed VERIFY or ROTATE surfaces as exactly one [`CredentialError`], whose
//! [`ErrorKind`] is picked by matching the driver's error text against a phrase table.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classified failure categories reported back to the PAM controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    UserNotFound,
    PasswordIncorrect,
    ConnectionFailed,
    LoginNotPermitted,
    TlsNotSupported,
    GenericFailure,
}

impl ErrorKind {
    /// Kinds that are matched by phrase, in the order they are tested.
    pub const MATCHED: [ErrorKind; 5] = [
        ErrorKind::UserNotFound,
        ErrorKind::PasswordIncorrect,
        ErrorKind::ConnectionFailed,
        ErrorKind::LoginNotPermitted,
        ErrorKind::TlsNotSupported,
    ];

    /// Message code understood by the PAM controller
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::GenericFailure => "PAM-EF-1401",
            ErrorKind::PasswordIncorrect => "PAM-EF-1402",
            ErrorKind::ConnectionFailed => "PAM-EF-1404",
            ErrorKind::UserNotFound => "PAM-EF-1406",
            ErrorKind::TlsNotSupported => "PAM-EF-1407",
            ErrorKind::LoginNotPermitted => "PAM-EF-1408",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UserNotFound => "USER_NOT_FOUND",
            ErrorKind::PasswordIncorrect => "PASSWORD_INCORRECT",
            ErrorKind::ConnectionFailed => "CONNECTION_FAILED",
            ErrorKind::LoginNotPermitted => "LOGIN_NOT_PERMITTED",
            ErrorKind::TlsNotSupported => "TLS_NOT_SUPPORTED",
            ErrorKind::GenericFailure => "GENERIC_FAILURE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure arm of an operation: a kind plus the message arguments for it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} ({}) {args:?}", .kind.code())]
pub struct CredentialError {
    pub kind: ErrorKind,
    pub args: Vec<String>,
}

impl CredentialError {
    pub fn new(kind: ErrorKind, args: Vec<String>) -> Self {
        Self { kind, args }
    }

    pub fn generic() -> Self {
        Self::new(ErrorKind::GenericFailure, Vec::new())
    }
}

/// Errors returned across the driver seam
#[derive(Debug, Error)]
pub enum DriverError {
    /// Error raised by the database client library; its text is classified
    #[error("{0}")]
    Database(String),

    /// Anything else (timeouts, TLS setup, runtime failures)
    #[error("{0}")]
    Other(String),
}

/// Request rejected before any connection is attempted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Missing mandatory arguments in the request: {}", .0.join(", "))]
    MissingArguments(Vec<&'static str>),
}

/// Values the error arguments are filled from
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    /// Target account name
    pub username: &'a str,
    /// Account that attempted to log in (target or master)
    pub login_username: &'a str,
    pub hostname: &'a str,
    pub port: u16,
}

/// Phrase lists used to classify driver error text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub user_not_found: Vec<String>,
    pub password_incorrect: Vec<String>,
    pub connection_failed: Vec<String>,
    pub login_not_permitted: Vec<String>,
    pub tls_not_supported: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            user_not_found: vec!["does not exist".to_string()],
            password_incorrect: vec!["password authentication failed".to_string()],
            connection_failed: vec![
                "Check that the hostname and port are correct".to_string(),
                "error connecting to server".to_string(),
            ],
            login_not_permitted: vec!["is not permitted to log in".to_string()],
            tls_not_supported: vec![
                "The server does not support SSL".to_string(),
                "server does not support TLS".to_string(),
            ],
        }
    }
}

impl ClassificationConfig {
    fn phrases(&self, kind: ErrorKind) -> &[String] {
        match kind {
            ErrorKind::UserNotFound => &self.user_not_found,
            ErrorKind::PasswordIncorrect => &self.password_incorrect,
            ErrorKind::ConnectionFailed => &self.connection_failed,
            ErrorKind::LoginNotPermitted => &self.login_not_permitted,
            ErrorKind::TlsNotSupported => &self.tls_not_supported,
            ErrorKind::GenericFailure => &[],
        }
    }
}

/// Maps driver error text onto [`ErrorKind`]
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    phrases: ClassificationConfig,
}

impl ErrorClassifier {
    pub fn new(phrases: ClassificationConfig) -> Self {
        Self { phrases }
    }

    /// Kind whose phrase first occurs in `text`, if any
    pub fn match_text(&self, text: &str) -> Option<ErrorKind> {
        ErrorKind::MATCHED.into_iter().find(|kind| {
            self.phrases
                .phrases(*kind)
                .iter()
                .any(|phrase| !phrase.is_empty() && text.contains(phrase.as_str()))
        })
    }

    /// Classify a single originating error into the caller-facing form
    pub fn classify(&self, error: &DriverError, ctx: &FailureContext<'_>) -> CredentialError {
        let kind = match error {
            DriverError::Database(text) => self.match_text(text),
            DriverError::Other(_) => None,
        }
        .unwrap_or(ErrorKind::GenericFailure);

        let args = match kind {
            ErrorKind::UserNotFound => vec![ctx.username.to_string()],
            ErrorKind::ConnectionFailed => vec![format!("{}:{}", ctx.hostname, ctx.port)],
            ErrorKind::LoginNotPermitted => vec![ctx.login_username.to_string()],
            ErrorKind::PasswordIncorrect
            | ErrorKind::TlsNotSupported
            | ErrorKind::GenericFailure => Vec::new(),
        };

        CredentialError::new(kind, args)
    }
}
