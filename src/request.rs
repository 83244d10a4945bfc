//! Account records supplied by the PAM controller
//!
//! The controller posts one account per request, together with the application and
//! server it belongs to and, optionally, the master accounts referenced by it.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::RequestError;

/// Target server the application lives on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TargetServer {
    pub host_name: String,
    pub device_name: String,
}

/// Application (database endpoint) an account belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TargetApplication {
    pub name: String,
    pub extended_attributes: HashMap<String, String>,
    pub target_server: TargetServer,
}

impl TargetApplication {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.extended_attributes.get(name).map(String::as_str)
    }
}

/// Account whose credentials are verified or rotated
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TargetAccount {
    pub user_name: String,
    /// Password to verify, or the new password when rotating
    pub password: SecretString,
    pub old_password: Option<SecretString>,
    pub old_user_name: String,
    pub extended_attributes: HashMap<String, String>,
    pub target_application: TargetApplication,
    /// Master accounts keyed by the attribute that references them
    pub master_accounts: HashMap<String, TargetAccount>,
}

impl Default for TargetAccount {
    fn default() -> Self {
        Self {
            user_name: String::new(),
            password: SecretString::from(String::new()),
            old_password: None,
            old_user_name: String::new(),
            extended_attributes: HashMap::new(),
            target_application: TargetApplication::default(),
            master_accounts: HashMap::new(),
        }
    }
}

impl TargetAccount {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.extended_attributes.get(name).map(String::as_str)
    }

    pub fn master_account(&self, attribute: &str) -> Option<&TargetAccount> {
        self.master_accounts.get(attribute)
    }

    pub fn hostname(&self) -> &str {
        &self.target_application.target_server.host_name
    }

    /// Parse a request body
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// True when no password was supplied
pub fn is_blank(secret: &SecretString) -> bool {
    secret.expose_secret().is_empty()
}

/// Operation a request is validated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Verify,
    Rotate,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Verify => "verify",
            Operation::Rotate => "rotate",
        }
    }
}

/// Check that the mandatory fields for `operation` are present
pub fn validate(account: &TargetAccount, operation: Operation) -> Result<(), RequestError> {
    let mut missing = Vec::new();

    if account.hostname().is_empty() {
        missing.push("hostname");
    }
    if account.user_name.is_empty() {
        missing.push("userName");
    }
    if is_blank(&account.password) {
        missing.push("password");
    }

    if operation == Operation::Rotate {
        if account.old_password.as_ref().map_or(true, is_blank) {
            missing.push("oldPassword");
        }
        if account.old_user_name.is_empty() {
            missing.push("oldUserName");
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(RequestError::MissingArguments(missing))
    }
}
