//! Master keys and the AES-256-GCM sealing used by both keyring files

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{KeyringError, KeyringResult};
use crate::secret::SecretString;

/// Length of generated master keys, in characters
pub const MASTER_KEY_LENGTH: usize = 32;

const NONCE_LEN: usize = 12;

/// Encryption key protecting a keyring
///
/// Master keys are text so they can travel through external reader/writer
/// processes and terminal prompts unchanged. The AES key is derived from the
/// text with SHA-256.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey(SecretString);

impl MasterKey {
    /// Wrap existing key material
    pub fn new(key: impl Into<SecretString>) -> Self {
        Self(key.into())
    }

    /// Generate a random alphanumeric key of [`MASTER_KEY_LENGTH`] characters
    pub fn generate() -> Self {
        let key: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(MASTER_KEY_LENGTH)
            .map(char::from)
            .collect();
        Self(SecretString::new(key))
    }

    /// Access the key text within a closure scope
    pub fn expose_secret<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        self.0.expose_secret(f)
    }

    /// Whether the key text is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn cipher_key(&self) -> Zeroizing<[u8; 32]> {
        let mut key = Zeroizing::new([0u8; 32]);
        self.0
            .expose_secret(|s| key.copy_from_slice(&Sha256::digest(s.as_bytes())));
        key
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Nonce and ciphertext of one AEAD seal, base64 encoded for JSON files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Sealed {
    pub nonce: String,
    pub ciphertext: String,
}

pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    bytes
}

pub(crate) fn seal(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> KeyringResult<Sealed> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce_bytes: [u8; NONCE_LEN] = random_bytes();
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| KeyringError::Encryption(e.to_string()))?;

    Ok(Sealed {
        nonce: STANDARD.encode(nonce_bytes),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

/// Returns `None` when authentication fails; malformed encoding is `Format`.
pub(crate) fn open(
    key: &[u8; 32],
    sealed: &Sealed,
    aad: &[u8],
    path: &std::path::Path,
) -> KeyringResult<Option<Zeroizing<Vec<u8>>>> {
    let format_err = |reason: &str| KeyringError::Format {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let nonce = STANDARD
        .decode(&sealed.nonce)
        .map_err(|_| format_err("nonce is not base64"))?;
    if nonce.len() != NONCE_LEN {
        return Err(format_err("nonce has wrong length"));
    }
    let ciphertext = STANDARD
        .decode(&sealed.ciphertext)
        .map_err(|_| format_err("ciphertext is not base64"))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    Ok(cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad,
            },
        )
        .ok()
        .map(Zeroizing::new))
}
