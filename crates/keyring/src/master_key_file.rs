//! Master key file: maps keyring identities to their master keys
//!
//! The file carries its own randomly generated file key; every entry is
//! sealed under that key with the keyring id as associated data, so entries
//! cannot be swapped between keyrings. Protection of the file itself rests on
//! owner-only permissions.

use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{self, MasterKey, Sealed, random_bytes};
use crate::error::{KeyringError, KeyringResult};
use crate::fs::{atomic_write, read_optional};
use crate::keyring::KeyringId;
use crate::secret::SecretString;

const MASTER_KEY_FILE_FORMAT: &str = "routerboot-master-key-file";
const CURRENT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct MasterKeyFileData {
    format: String,
    version: u32,
    file_key: String,
    entries: BTreeMap<String, Sealed>,
}

/// Collection of master keys, one per keyring identity
pub struct MasterKeyFile {
    file_key: Zeroizing<[u8; 32]>,
    entries: BTreeMap<KeyringId, Sealed>,
}

impl MasterKeyFile {
    /// Create an empty master key file with a fresh file key
    pub fn new() -> Self {
        Self {
            file_key: Zeroizing::new(random_bytes()),
            entries: BTreeMap::new(),
        }
    }

    /// Load from disk
    ///
    /// Returns [`KeyringError::NotFound`] when the file does not exist, which
    /// callers treat differently from a file that exists but is unusable.
    pub fn load(path: &Path) -> KeyringResult<Self> {
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

        let parsed: MasterKeyFileData =
            serde_json::from_slice(&data).map_err(|e| format_err(e.to_string()))?;
        if parsed.format != MASTER_KEY_FILE_FORMAT {
            return Err(format_err(format!("unexpected format '{}'", parsed.format)));
        }
        if parsed.version > CURRENT_VERSION {
            return Err(format_err(format!("unsupported version {}", parsed.version)));
        }

        let raw_key = Zeroizing::new(
            STANDARD
                .decode(&parsed.file_key)
                .map_err(|_| format_err("file key is not base64".to_string()))?,
        );
        let mut file_key = Zeroizing::new([0u8; 32]);
        if raw_key.len() != file_key.len() {
            return Err(format_err("file key has wrong length".to_string()));
        }
        file_key.copy_from_slice(&raw_key);

        let entries = parsed
            .entries
            .into_iter()
            .map(|(id, sealed)| -> KeyringResult<_> { Ok((KeyringId::parse(&id)?, sealed)) })
            .collect::<KeyringResult<_>>()?;

        Ok(Self { file_key, entries })
    }

    /// Look up the master key for a keyring
    ///
    /// `path` is only used for error messages.
    pub fn get(&self, id: &KeyringId, path: &Path) -> KeyringResult<Option<MasterKey>> {
        let Some(sealed) = self.entries.get(id) else {
            return Ok(None);
        };

        let plaintext = crypto::open(&self.file_key, sealed, id.as_str().as_bytes(), path)?
            .ok_or_else(|| KeyringError::DecryptionFailed {
                path: path.to_path_buf(),
            })?;
        let key = String::from_utf8(plaintext.to_vec()).map_err(|_| KeyringError::Format {
            path: path.to_path_buf(),
            reason: format!("master key for {id} is not UTF-8"),
        })?;

        Ok(Some(MasterKey::new(SecretString::new(key))))
    }

    /// Store or replace the master key for a keyring
    pub fn insert(&mut self, id: &KeyringId, key: &MasterKey) -> KeyringResult<()> {
        let sealed = key.expose_secret(|k| {
            crypto::seal(&self.file_key, k.as_bytes(), id.as_str().as_bytes())
        })?;
        self.entries.insert(id.clone(), sealed);
        Ok(())
    }

    /// Write to disk with owner-only permissions
    pub fn save(&self, path: &Path) -> KeyringResult<()> {
        let data = MasterKeyFileData {
            format: MASTER_KEY_FILE_FORMAT.to_string(),
            version: CURRENT_VERSION,
            file_key: STANDARD.encode(&*self.file_key),
            entries: self
                .entries
                .iter()
                .map(|(id, sealed)| (id.to_string(), sealed.clone()))
                .collect(),
        };
        let json = Zeroizing::new(
            serde_json::to_vec_pretty(&data).map_err(|e| KeyringError::Encryption(e.to_string()))?,
        );

        atomic_write(path, &json).map_err(|source| KeyringError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), entries = self.entries.len(), "Master key file saved");
        Ok(())
    }
}

impl Default for MasterKeyFile {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MasterKeyFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKeyFile")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
