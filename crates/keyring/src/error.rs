//! Error types for keyring and master key operations
//!
//! Two tiers:
//! - [`KeyringError`]: file I/O, format and cryptographic failures of the
//!   keyring and master key file
//! - [`MasterKeyError`]: selection and resolution of the master key source,
//!   wrapping [`KeyringError`] where the storage layer is involved

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Keyring and master key file storage errors
#[derive(Debug, Error)]
pub enum KeyringError {
    /// File does not exist
    #[error("File '{}' not found", path.display())]
    NotFound {
        /// Path that was opened
        path: PathBuf,
    },

    /// Failed to read file
    #[error("Failed to read '{}': {source}", path.display())]
    Read {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{}': {source}", path.display())]
    Write {
        /// Path that was written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File exists but is not a valid keyring or master key file
    #[error("Invalid file format in '{}': {reason}", path.display())]
    Format {
        /// Offending path
        path: PathBuf,
        /// What was wrong
        reason: String,
    },

    /// Decryption failed - wrong key or corrupted data
    #[error("Decryption of '{}' failed - wrong master key or corrupted data", path.display())]
    DecryptionFailed {
        /// Path of the sealed file
        path: PathBuf,
    },

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Keyring identity token is malformed
    #[error("Invalid keyring id '{id}': {reason}")]
    InvalidId {
        /// The invalid id
        id: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type alias for keyring storage operations
pub type KeyringResult<T> = Result<T, KeyringError>;

/// Master key source errors
#[derive(Debug, Error)]
pub enum MasterKeyError {
    /// Two master key sources were configured at once
    #[error("Options {first} and {second} are mutually exclusive")]
    MutuallyExclusive {
        /// First configured option
        first: &'static str,
        /// Second configured option
        second: &'static str,
    },

    /// Reader configured without writer
    #[error("Option --master-key-reader requires --master-key-writer")]
    ReaderWithoutWriter,

    /// Writer configured without reader
    #[error("Option --master-key-writer requires --master-key-reader")]
    WriterWithoutReader,

    /// External command could not be started
    #[error("Could not run '{command}': {source}")]
    Spawn {
        /// Command that failed to start
        command: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Reader exited with failure
    #[error("Master key reader '{command}' failed ({status}): {stderr}")]
    ReaderFailed {
        /// Reader command
        command: String,
        /// Exit status
        status: ExitStatus,
        /// Captured standard error
        stderr: String,
    },

    /// Writer exited with failure
    #[error("Master key writer '{command}' failed ({status}): {stderr}")]
    WriterFailed {
        /// Writer command
        command: String,
        /// Exit status
        status: ExitStatus,
        /// Captured standard error
        stderr: String,
    },

    /// The key could not be handed to the writer's standard input
    #[error("Failed to pass the master key to writer '{command}': {source}")]
    WriterInput {
        /// Writer command
        command: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Reader printed something that is not a key
    #[error("Master key reader '{command}' produced invalid output: {reason}")]
    InvalidReaderOutput {
        /// Reader command
        command: String,
        /// What was wrong
        reason: String,
    },

    /// Keyring exists but its master key is unknown to the source
    #[error("Keyring '{}' exists but {origin} has no master key for it", keyring_path.display())]
    MasterKeyMissing {
        /// Existing keyring
        keyring_path: PathBuf,
        /// Human readable source description
        origin: String,
    },

    /// Master key located but does not decrypt the keyring
    #[error(
        "Master key from {origin} does not decrypt keyring '{}'",
        keyring_path.display()
    )]
    KeyMismatch {
        /// Existing keyring
        keyring_path: PathBuf,
        /// Human readable source description
        origin: String,
    },

    /// Empty key entered or read
    #[error("Master key must not be empty")]
    EmptyKey,

    /// Prompt I/O failed
    #[error("Could not read master key from terminal: {0}")]
    Prompt(#[source] std::io::Error),

    /// Rotation requested on a source that cannot persist a new key
    #[error("Master key rotation is not supported for {origin}")]
    RotationUnsupported {
        /// Human readable source description
        origin: String,
    },

    /// Storage layer error
    #[error(transparent)]
    Keyring(#[from] KeyringError),
}

/// Result type alias for master key operations
pub type MasterKeyResult<T> = Result<T, MasterKeyError>;
