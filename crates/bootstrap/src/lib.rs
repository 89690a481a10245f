//! Router bootstrap orchestration
//!
//! Ties account provisioning and keyring setup into one run that either
//! completes or leaves the system as it found it.
//!
//! ```text
//! Bootstrapper::run
//!   ├─ directory checks      (fresh / re-bootstrap / --force)
//!   ├─ AutoCleaner           (undo ledger, unwound on Drop)
//!   ├─ AccountProvisioner    (CREATE USER + GRANTs)
//!   ├─ MasterKeySource       (reader/writer, key file or prompt)
//!   ├─ KeyringStore          (account password, sealed)
//!   └─ ConfigWriter          (router configuration)
//! ```
//!
//! Operating system access goes through [`SystemIdentity`] so ownership
//! handling can be exercised without privileges.

mod bootstrap;
pub mod cleanup;
mod config_writer;
mod error;
mod options;
pub mod system;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use crate::bootstrap::{BootstrapReport, Bootstrapper};
pub use crate::cleanup::{AutoCleaner, CleanupAction, CleanupError};
pub use crate::config_writer::{ConfigWriter, IniConfigWriter, RouterConfig};
pub use crate::error::{BootstrapError, BootstrapResult, EXIT_FAILURE, EXIT_USAGE};
pub use crate::options::{
    BootstrapOptions, CONFIG_FILE_NAME, DEFAULT_MASTER_KEY_FILE_NAME, KEYRING_FILE_NAME,
    PASSWORD_FIELD, default_master_key_file,
};
#[cfg(unix)]
pub use crate::system::UnixIdentity;
pub use crate::system::{SystemIdentity, SystemUser};
