//! Router account provisioning
//!
//! Creates the database account a router uses to read cluster metadata,
//! tolerating accounts left behind by earlier bootstraps. The server is
//! reached through the synchronous [`MetadataConnection`] boundary.
//!
//! ```text
//! START TRANSACTION
//! CREATE USER IF NOT EXISTS 'u'@'h1' IDENTIFIED WITH ... , 'u'@'h2' ...
//! SHOW WARNINGS          -> which accounts already existed
//! GRANT ... TO <new accounts only>
//! COMMIT                 (ROLLBACK on any failure)
//! ```
#![forbid(unsafe_code)]

mod account;
pub mod classify;
mod connection;
mod error;
pub mod password;
mod provisioner;
mod sql;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use crate::account::{
    Account, AccountCreateMode, DEFAULT_PASSWORD_LENGTH, DEFAULT_PASSWORD_RETRIES, PasswordPolicy,
    ProvisioningOutcome,
};
pub use crate::classify::ErrorCategory;
pub use crate::connection::{MetadataConnection, Row, SqlError, SqlWarning};
pub use crate::error::{ProvisioningError, ProvisioningResult, Stage};
pub use crate::provisioner::{AccountProvisioner, drop_accounts};
pub use routerboot_keyring::SecretString;
