//! Bootstrap errors
//!
//! [`BootstrapError`] wraps the component errors unchanged so their messages
//! reach the operator verbatim, and maps each to a process exit code.

use std::collections::BTreeSet;
use std::path::PathBuf;

use routerboot_account::ProvisioningError;
use routerboot_keyring::{KeyringError, MasterKeyError};
use thiserror::Error;

use crate::cleanup::CleanupError;

/// Exit code for failures during bootstrap
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for invalid options, reported before any change is made
pub const EXIT_USAGE: i32 = 2;

/// Bootstrap errors
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Account provisioning failed
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// Master key resolution failed
    #[error(transparent)]
    MasterKey(#[from] MasterKeyError),

    /// Keyring storage failed
    #[error(transparent)]
    Keyring(#[from] KeyringError),

    /// Cleanup ledger rejected a registration
    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    /// Target directory holds files that are not a router installation
    #[error(
        "Directory '{}' already contains files; use --force to bootstrap into it anyway",
        directory.display()
    )]
    DirectoryNotEmpty {
        /// Target directory
        directory: PathBuf,
    },

    /// Accounts already existed but their password is unknown
    #[error(
        "Account(s) {} already exist but no password is known for them; \
         pass --account-password or choose another --account",
        accounts.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    )]
    UnknownAccountPassword {
        /// Existing `'user'@'host'` accounts
        accounts: BTreeSet<String>,
    },

    /// `--user` names no system user
    #[error("System user '{0}' does not exist")]
    UnknownUser(String),

    /// File system operation failed
    #[error("{operation} '{}' failed: {source}", path.display())]
    Io {
        /// What was attempted
        operation: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid option combination
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BootstrapError {
    /// Map an I/O failure of `operation` on `path`
    pub fn io(
        operation: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            operation,
            path,
            source,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::UnknownUser(_) | Self::DirectoryNotEmpty { .. } => EXIT_USAGE,
            Self::MasterKey(
                MasterKeyError::MutuallyExclusive { .. }
                | MasterKeyError::ReaderWithoutWriter
                | MasterKeyError::WriterWithoutReader,
            ) => EXIT_USAGE,
            Self::Provisioning(
                ProvisioningError::InvalidAccount(_)
                | ProvisioningError::InvalidPolicy(_)
                | ProvisioningError::MissingPassword,
            ) => EXIT_USAGE,
            _ => EXIT_FAILURE,
        }
    }
}

/// Result type alias for bootstrap
pub type BootstrapResult<T> = Result<T, BootstrapError>;
