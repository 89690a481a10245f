//! Router keyring bootstrap
//!
//! Encrypted local secret storage for a database router and the resolution
//! of the master key that protects it.
//!
//! # Layout
//!
//! - [`Keyring`] - decrypted `(principal, field) -> secret` map with a
//!   [`KeyringId`] identity token
//! - [`KeyringStore`] / [`FileKeyringStore`] - sealed keyring files
//! - [`MasterKeyFile`] - keyring id to master key mapping
//! - [`MasterKeySource`] - external reader/writer, master key file or prompt
//! - [`rotate_master_key`] - re-key a keyring in place
#![forbid(unsafe_code)]

mod crypto;
mod error;
mod fs;
mod keyring;
mod master_key_file;
mod rotate;
mod secret;
mod source;
mod store;

pub use crate::crypto::{MASTER_KEY_LENGTH, MasterKey};
pub use crate::error::{KeyringError, KeyringResult, MasterKeyError, MasterKeyResult};
pub use crate::fs::atomic_write;
pub use crate::keyring::{Keyring, KeyringId};
pub use crate::master_key_file::MasterKeyFile;
pub use crate::rotate::{RotationOutcome, rotate_master_key};
pub use crate::secret::SecretString;
pub use crate::source::{
    KeyOrigin, KeyringTarget, MasterKeyOptions, MasterKeySource, Prompter, ResolvedMasterKey,
    TerminalPrompter,
};
pub use crate::store::{FileKeyringStore, KeyringStore, SealedKeyring};
