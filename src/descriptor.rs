//! Request descriptor resolution
//!
//! Turns a [`TargetAccount`] record into the flat [`AccountDescriptor`] the executor
//! works with, and decides once whether a password change is delegated to a master
//! account. Malformed optional attributes fall back to defaults and never fail.

use secrecy::SecretString;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::DriverLogLevel;
use crate::request::{is_blank, TargetAccount};

pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_LOGIN_TIMEOUT_MS: u64 = 5000;

/// `changeProcess` value selecting delegation to a master account
pub const CHANGE_PROCESS_OTHER: &str = "other";

pub const FIELD_PORT: &str = "port";
pub const FIELD_CONNECT_TIMEOUT: &str = "connectionTimeout";
pub const FIELD_LOGIN_TIMEOUT: &str = "loginTimeout";
pub const FIELD_DATABASE: &str = "database";
pub const FIELD_USE_TLS: &str = "useTLS";
pub const FIELD_CHANGE_PROCESS: &str = "changeProcess";
pub const FIELD_MASTER_ACCOUNT: &str = "otherAccount";

/// Everything needed to reach and authenticate the target account
#[derive(Debug, Clone)]
pub struct AccountDescriptor {
    pub hostname: String,
    pub port: u16,
    pub database: String,
    pub use_tls: bool,
    pub connect_timeout_ms: u64,
    pub login_timeout_ms: u64,
    pub username: String,
    /// Password to verify, or the new password when rotating
    pub current_password: SecretString,
    /// Login credential for VERIFY and self-managed ROTATE; never blank
    pub previous_password: SecretString,
}

/// Credentials of the account that changes the target's password on its behalf
#[derive(Debug, Clone)]
pub struct MasterAccount {
    pub username: String,
    pub password: SecretString,
    pub database: String,
}

/// Which account authenticates for a ROTATE
#[derive(Debug, Clone)]
pub enum DelegationMode {
    /// Target logs in with its previous password and changes its own password
    SelfManaged,
    /// A fully specified master account logs in and changes the password
    Master(MasterAccount),
}

impl DelegationMode {
    pub fn is_master(&self) -> bool {
        matches!(self, DelegationMode::Master(_))
    }
}

/// Username/password/database used to open a session
#[derive(Debug, Clone, Copy)]
pub struct LoginIdentity<'a> {
    pub username: &'a str,
    pub password: &'a SecretString,
    pub database: &'a str,
}

/// Descriptor plus the delegation decision for one request
#[derive(Debug, Clone)]
pub struct ResolvedAccount {
    pub descriptor: AccountDescriptor,
    pub delegation: DelegationMode,
}

impl ResolvedAccount {
    /// Resolve a request record
    pub fn resolve(account: &TargetAccount) -> Self {
        Self {
            descriptor: AccountDescriptor::resolve(account),
            delegation: resolve_delegation(account),
        }
    }

    /// Identity used by VERIFY: always the target with its previous password
    pub fn verify_identity(&self) -> LoginIdentity<'_> {
        self.descriptor.self_identity()
    }

    /// Identity used by ROTATE, following the delegation mode
    pub fn rotate_identity(&self) -> LoginIdentity<'_> {
        match &self.delegation {
            DelegationMode::SelfManaged => self.descriptor.self_identity(),
            DelegationMode::Master(master) => LoginIdentity {
                username: &master.username,
                password: &master.password,
                database: &master.database,
            },
        }
    }
}

impl AccountDescriptor {
    /// Read server, application and account attributes from a request record
    pub fn resolve(account: &TargetAccount) -> Self {
        let application = &account.target_application;

        let hostname = account.hostname().to_string();
        debug!("hostname= {}", hostname);

        let port = parse_or_default(application.attribute(FIELD_PORT), FIELD_PORT, DEFAULT_PORT);
        let connect_timeout_ms = parse_or_default(
            application.attribute(FIELD_CONNECT_TIMEOUT),
            FIELD_CONNECT_TIMEOUT,
            DEFAULT_CONNECT_TIMEOUT_MS,
        );
        let login_timeout_ms = parse_or_default(
            application.attribute(FIELD_LOGIN_TIMEOUT),
            FIELD_LOGIN_TIMEOUT,
            DEFAULT_LOGIN_TIMEOUT_MS,
        );

        let database = application
            .attribute(FIELD_DATABASE)
            .unwrap_or_default()
            .to_string();
        debug!("{}= {}", FIELD_DATABASE, database);

        let use_tls = application.attribute(FIELD_USE_TLS) == Some("true");
        debug!("{}= {}", FIELD_USE_TLS, use_tls);

        let username = account.user_name.clone();
        debug!("username= {}", username);

        let current_password = account.password.clone();
        let previous_password = match &account.old_password {
            Some(old) if !is_blank(old) => old.clone(),
            _ => {
                debug!("oldPassword is empty, set oldPassword to password");
                current_password.clone()
            }
        };

        Self {
            hostname,
            port,
            database,
            use_tls,
            connect_timeout_ms,
            login_timeout_ms,
            username,
            current_password,
            previous_password,
        }
    }

    fn self_identity(&self) -> LoginIdentity<'_> {
        LoginIdentity {
            username: &self.username,
            password: &self.previous_password,
            database: &self.database,
        }
    }

    /// Connection parameters for a session opened as `login`
    pub fn connect_params(&self, login: LoginIdentity<'_>, log_level: DriverLogLevel) -> ConnectParams {
        ConnectParams {
            hostname: self.hostname.clone(),
            port: self.port,
            database: login.database.to_string(),
            user: login.username.to_string(),
            password: login.password.clone(),
            use_tls: self.use_tls,
            connect_timeout_secs: whole_seconds(self.connect_timeout_ms),
            login_timeout_secs: whole_seconds(self.login_timeout_ms),
            log_level,
        }
    }
}

/// Delegate only when asked to and the master account is fully specified
fn resolve_delegation(account: &TargetAccount) -> DelegationMode {
    if account.attribute(FIELD_CHANGE_PROCESS) != Some(CHANGE_PROCESS_OTHER) {
        debug!("Delegation not requested, changing password as the account itself");
        return DelegationMode::SelfManaged;
    }

    let Some(master) = account.master_account(FIELD_MASTER_ACCOUNT) else {
        debug!("No master account, changing password as the account itself");
        return DelegationMode::SelfManaged;
    };

    if master.user_name.is_empty() {
        warn!("Master account username is empty, changing password as the account itself");
        return DelegationMode::SelfManaged;
    }
    if is_blank(&master.password) {
        warn!("Master account password is empty, changing password as the account itself");
        return DelegationMode::SelfManaged;
    }

    let database = master
        .target_application
        .attribute(FIELD_DATABASE)
        .unwrap_or_default()
        .to_string();
    debug!("Delegating to master account '{}' on database '{}'", master.user_name, database);

    DelegationMode::Master(MasterAccount {
        username: master.user_name.clone(),
        password: master.password.clone(),
        database,
    })
}

fn parse_or_default<T>(value: Option<&str>, field: &str, default: T) -> T
where
    T: FromStr + fmt::Display + Copy,
{
    let parsed = match value.map(str::parse::<T>) {
        Some(Ok(parsed)) => parsed,
        _ => {
            warn!("Using default {} ({})", field, default);
            default
        }
    };
    debug!("{}= {}", field, parsed);
    parsed
}

/// Milliseconds to whole seconds, never below one
fn whole_seconds(ms: u64) -> u64 {
    (ms / 1000).max(1)
}

/// Connection settings for one session
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub hostname: String,
    pub port: u16,
    /// Empty means the server default (the login user's name)
    pub database: String,
    pub user: String,
    pub password: SecretString,
    pub use_tls: bool,
    pub connect_timeout_secs: u64,
    pub login_timeout_secs: u64,
    pub log_level: DriverLogLevel,
}

impl ConnectParams {
    /// `<hostname>:<port>/<database>`
    pub fn address(&self) -> String {
        format!("{}:{}/{}", self.hostname, self.port, self.database)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    /// Connection properties without the password
    pub fn properties(&self) -> Vec<(&'static str, String)> {
        let mut props = vec![
            ("user", self.user.clone()),
            ("ssl", self.use_tls.to_string()),
        ];
        if self.use_tls {
            props.push(("sslmode", "require".to_string()));
            props.push(("sslverify", "none".to_string()));
        }
        props.push(("loginTimeout", self.login_timeout_secs.to_string()));
        props.push(("connectTimeout", self.connect_timeout_secs.to_string()));
        props.push(("loggerLevel", self.log_level.as_str().to_string()));
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{TargetApplication, TargetServer};
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn account(app_attrs: &[(&str, &str)]) -> TargetAccount {
        TargetAccount {
            user_name: "svc".to_string(),
            password: SecretString::from("X"),
            target_application: TargetApplication {
                name: "orders-db".to_string(),
                extended_attributes: attrs(app_attrs),
                target_server: TargetServer {
                    host_name: "db.example.com".to_string(),
                    device_name: "db01".to_string(),
                },
            },
            ..TargetAccount::default()
        }
    }

    fn master(user: &str, password: &str) -> TargetAccount {
        TargetAccount {
            user_name: user.to_string(),
            password: SecretString::from(password),
            target_application: TargetApplication {
                extended_attributes: attrs(&[(FIELD_DATABASE, "postgres")]),
                ..TargetApplication::default()
            },
            ..TargetAccount::default()
        }
    }

    fn delegated(master_account: Option<TargetAccount>) -> TargetAccount {
        let mut acct = account(&[(FIELD_DATABASE, "orders")]);
        acct.extended_attributes = attrs(&[(FIELD_CHANGE_PROCESS, CHANGE_PROCESS_OTHER)]);
        if let Some(m) = master_account {
            acct.master_accounts.insert(FIELD_MASTER_ACCOUNT.to_string(), m);
        }
        acct
    }

    #[test]
    fn test_resolve_attributes() {
        let acct = account(&[
            (FIELD_PORT, "5433"),
            (FIELD_CONNECT_TIMEOUT, "2500"),
            (FIELD_LOGIN_TIMEOUT, "12000"),
            (FIELD_DATABASE, "orders"),
            (FIELD_USE_TLS, "true"),
        ]);
        let d = AccountDescriptor::resolve(&acct);
        assert_eq!(d.hostname, "db.example.com");
        assert_eq!(d.port, 5433);
        assert_eq!(d.connect_timeout_ms, 2500);
        assert_eq!(d.login_timeout_ms, 12000);
        assert_eq!(d.database, "orders");
        assert!(d.use_tls);
        assert_eq!(d.username, "svc");
    }

    #[test]
    fn test_malformed_numbers_use_defaults() {
        for bad in ["", "abc", "-1", "5432.0", " 5432", "99999999999999999999999"] {
            let acct = account(&[
                (FIELD_PORT, bad),
                (FIELD_CONNECT_TIMEOUT, bad),
                (FIELD_LOGIN_TIMEOUT, bad),
            ]);
            let d = AccountDescriptor::resolve(&acct);
            assert_eq!(d.port, DEFAULT_PORT, "port from {:?}", bad);
            assert_eq!(d.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
            assert_eq!(d.login_timeout_ms, DEFAULT_LOGIN_TIMEOUT_MS);
        }

        let d = AccountDescriptor::resolve(&account(&[]));
        assert_eq!(d.port, DEFAULT_PORT);
        assert_eq!(d.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert_eq!(d.login_timeout_ms, DEFAULT_LOGIN_TIMEOUT_MS);
        assert_eq!(d.database, "");
    }

    #[test]
    fn test_tls_only_for_exact_true() {
        for value in ["TRUE", "True", "yes", "1", " true", ""] {
            assert!(!AccountDescriptor::resolve(&account(&[(FIELD_USE_TLS, value)])).use_tls);
        }
        assert!(!AccountDescriptor::resolve(&account(&[])).use_tls);
        assert!(AccountDescriptor::resolve(&account(&[(FIELD_USE_TLS, "true")])).use_tls);
    }

    #[test]
    fn test_previous_password_defaults_to_current() {
        let mut acct = account(&[]);
        acct.old_password = Some(SecretString::from(""));
        let d = AccountDescriptor::resolve(&acct);
        assert_eq!(d.previous_password.expose_secret(), "X");

        acct.old_password = None;
        let d = AccountDescriptor::resolve(&acct);
        assert_eq!(d.previous_password.expose_secret(), "X");

        acct.old_password = Some(SecretString::from("old"));
        let d = AccountDescriptor::resolve(&acct);
        assert_eq!(d.previous_password.expose_secret(), "old");
        assert_eq!(d.current_password.expose_secret(), "X");
    }

    #[test]
    fn test_delegation_requires_change_process_other() {
        let mut acct = delegated(Some(master("admin", "s3cret")));
        assert!(ResolvedAccount::resolve(&acct).delegation.is_master());

        acct.extended_attributes = attrs(&[(FIELD_CHANGE_PROCESS, "self")]);
        assert!(!ResolvedAccount::resolve(&acct).delegation.is_master());

        acct.extended_attributes.clear();
        assert!(!ResolvedAccount::resolve(&acct).delegation.is_master());
    }

    #[test]
    fn test_delegation_downgrades_when_master_incomplete() {
        for acct in [
            delegated(None),
            delegated(Some(master("", "s3cret"))),
            delegated(Some(master("admin", ""))),
        ] {
            assert!(matches!(
                ResolvedAccount::resolve(&acct).delegation,
                DelegationMode::SelfManaged
            ));
        }
    }

    #[test]
    fn test_rotate_identity_follows_delegation() {
        let mut acct = delegated(Some(master("admin", "s3cret")));
        acct.old_password = Some(SecretString::from("old"));

        let resolved = ResolvedAccount::resolve(&acct);
        let login = resolved.rotate_identity();
        assert_eq!(login.username, "admin");
        assert_eq!(login.password.expose_secret(), "s3cret");
        assert_eq!(login.database, "postgres");

        let verify = resolved.verify_identity();
        assert_eq!(verify.username, "svc");
        assert_eq!(verify.password.expose_secret(), "old");
        assert_eq!(verify.database, "orders");

        acct.master_accounts.clear();
        let resolved = ResolvedAccount::resolve(&acct);
        let (login, verify) = (resolved.rotate_identity(), resolved.verify_identity());
        assert_eq!(login.username, verify.username);
        assert_eq!(login.password.expose_secret(), verify.password.expose_secret());
        assert_eq!(login.database, verify.database);
    }

    #[test]
    fn test_connect_params() {
        let acct = account(&[
            (FIELD_DATABASE, "orders"),
            (FIELD_USE_TLS, "true"),
            (FIELD_CONNECT_TIMEOUT, "500"),
            (FIELD_LOGIN_TIMEOUT, "7999"),
        ]);
        let resolved = ResolvedAccount::resolve(&acct);
        let params = resolved
            .descriptor
            .connect_params(resolved.verify_identity(), DriverLogLevel::Debug);

        assert_eq!(params.address(), "db.example.com:5432/orders");
        assert_eq!(params.connect_timeout_secs, 1);
        assert_eq!(params.login_timeout_secs, 7);

        let props = params.properties();
        assert!(props.contains(&("ssl", "true".to_string())));
        assert!(props.contains(&("sslmode", "require".to_string())));
        assert!(props.contains(&("loggerLevel", "DEBUG".to_string())));
        assert_eq!(params.password.expose_secret(), "X");
        assert!(!format!("{:?}", params).contains("\"X\""));
    }

    #[test]
    fn test_debug_hides_passwords() {
        let mut acct = delegated(Some(master("admin", "s3cret")));
        acct.password = SecretString::from("n3w-pass");
        acct.old_password = Some(SecretString::from("old-pass"));
        let debug = format!("{:?}", ResolvedAccount::resolve(&acct));
        assert!(!debug.contains("n3w-pass"));
        assert!(!debug.contains("old-pass"));
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("admin"));
    }
}
