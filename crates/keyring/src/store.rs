//! Keyring storage boundary
//!
//! [`KeyringStore`] is the seam between bootstrap logic and the on-disk
//! keyring. [`FileKeyringStore`] keeps one keyring per file as a JSON
//! envelope: the identity token in clear, the entries sealed with
//! AES-256-GCM under the master key with the token as associated data.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{self, MasterKey, Sealed};
use crate::error::{KeyringError, KeyringResult};
use crate::fs::{atomic_write, read_optional};
use crate::keyring::{Keyring, KeyringId};
use crate::secret::SecretString;

const KEYRING_FORMAT: &str = "routerboot-keyring";
const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyringEnvelope {
    format: String,
    version: u32,
    id: String,
    #[serde(flatten)]
    sealed: Sealed,
}

/// Keyring file whose header has been read but whose entries are still sealed
#[derive(Debug, Clone)]
pub struct SealedKeyring {
    path: std::path::PathBuf,
    id: KeyringId,
    sealed: Sealed,
}

impl SealedKeyring {
    /// Identity token from the header
    pub fn id(&self) -> &KeyringId {
        &self.id
    }

    /// Decrypt the entries with `key`
    pub fn unseal(&self, key: &MasterKey) -> KeyringResult<Keyring> {
        let plaintext = crypto::open(
            &key.cipher_key(),
            &self.sealed,
            self.id.as_str().as_bytes(),
            &self.path,
        )?
        .ok_or_else(|| KeyringError::DecryptionFailed {
            path: self.path.clone(),
        })?;

        let raw: BTreeMap<String, BTreeMap<String, String>> = serde_json::from_slice(&plaintext)
            .map_err(|e| KeyringError::Format {
                path: self.path.clone(),
                reason: format!("decrypted payload is not a keyring: {e}"),
            })?;

        let entries = raw
            .into_iter()
            .map(|(principal, fields)| {
                let fields = fields
                    .into_iter()
                    .map(|(field, value)| (field, SecretString::new(value)))
                    .collect();
                (principal, fields)
            })
            .collect();

        Ok(Keyring::from_parts(self.id.clone(), entries))
    }
}

/// Persistent keyring storage
pub trait KeyringStore {
    /// Whether a keyring file exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Read the header, keeping the entries sealed
    ///
    /// Returns [`KeyringError::NotFound`] when there is no file.
    fn open(&self, path: &Path) -> KeyringResult<SealedKeyring>;

    /// Write `keyring` sealed under `key`
    fn save(&self, path: &Path, keyring: &Keyring, key: &MasterKey) -> KeyringResult<()>;

    /// Read only the identity token
    fn read_header(&self, path: &Path) -> KeyringResult<KeyringId> {
        self.open(path).map(|sealed| sealed.id)
    }

    /// Open and decrypt in one step
    fn load(&self, path: &Path, key: &MasterKey) -> KeyringResult<Keyring> {
        self.open(path)?.unseal(key)
    }
}

/// File-backed keyring store
#[derive(Debug, Clone, Copy, Default)]
pub struct FileKeyringStore;

impl FileKeyringStore {
    /// Create a new file store
    pub fn new() -> Self {
        Self
    }
}

impl KeyringStore for FileKeyringStore {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn open(&self, path: &Path) -> KeyringResult<SealedKeyring> {
        let data = read_optional(path)
            .map_err(|source| KeyringError::Read {
                path: path.to_path_buf(),
                source,
            })?
            .ok_or_else(|| KeyringError::NotFound {
                path: path.to_path_buf(),
            })?;

        let format_err = |reason: String| KeyringError::Format {
            path: path.to_path_buf(),
            reason,
        };

        let envelope: KeyringEnvelope =
            serde_json::from_slice(&data).map_err(|e| format_err(e.to_string()))?;
        if envelope.format != KEYRING_FORMAT {
            return Err(format_err(format!("unexpected format '{}'", envelope.format)));
        }
        if envelope.version > CURRENT_VERSION {
            return Err(format_err(format!(
                "unsupported version {}",
                envelope.version
            )));
        }

        Ok(SealedKeyring {
            path: path.to_path_buf(),
            id: KeyringId::parse(&envelope.id)?,
            sealed: envelope.sealed,
        })
    }

    fn save(&self, path: &Path, keyring: &Keyring, key: &MasterKey) -> KeyringResult<()> {
        let payload = Zeroizing::new(
            serde_json::to_vec(&ExposedEntries(keyring.entries()))
                .map_err(|e| KeyringError::Encryption(e.to_string()))?,
        );
        let sealed = crypto::seal(&key.cipher_key(), &payload, keyring.id().as_str().as_bytes())?;

        let envelope = KeyringEnvelope {
            format: KEYRING_FORMAT.to_string(),
            version: CURRENT_VERSION,
            id: keyring.id().to_string(),
            sealed,
        };
        let json = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| KeyringError::Encryption(e.to_string()))?;

        atomic_write(path, &json).map_err(|source| KeyringError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), id = %keyring.id(), entries = keyring.len(), "Keyring saved");
        Ok(())
    }
}

/// Serializes secrets in place, without an intermediate plaintext copy
struct ExposedEntries<'a>(&'a BTreeMap<String, BTreeMap<String, SecretString>>);

struct ExposedFields<'a>(&'a BTreeMap<String, SecretString>);

struct Exposed<'a>(&'a SecretString);

impl Serialize for ExposedEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, ExposedFields(v))))
    }
}

impl Serialize for ExposedFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, Exposed(v))))
    }
}

impl Serialize for Exposed<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.expose_secret(|s| serializer.serialize_str(s))
    }
}
