//! PostgreSQL credential connector
//!
//! Verifies and rotates PostgreSQL account passwords on behalf of a PAM controller,
//! either as the account itself or through a master account.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod request;
pub mod rotation;
pub mod targets;

pub use config::Config;
pub use descriptor::{AccountDescriptor, DelegationMode, ResolvedAccount};
pub use error::{CredentialError, ErrorKind};
pub use rotation::{CredentialExecutor, OperationReport, OperationResult};
